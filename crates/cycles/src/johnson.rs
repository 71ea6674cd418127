//! Simple-cycle enumeration inside one strongly connected component.
//!
//! This is Johnson's algorithm with a length cap: each cycle is found exactly
//! once, rooted at its smallest vertex, and the search never extends a path
//! past `max_cycle_length` nodes. Cycles longer than the cap are simply not
//! enumerated; the component itself is still reported by the caller.

use foldhash::HashSet;

/// Enumerates the simple cycles of the subgraph induced by `component`.
///
/// `adjacency` is over dense node indices; the returned cycles are node-index
/// sequences without the closing repetition. `truncated` is set when the cap
/// stopped at least one search branch.
pub fn simple_cycles(
    adjacency: &[Vec<usize>],
    component: &[usize],
    max_cycle_length: usize,
) -> (Vec<Vec<usize>>, bool) {
    let members: HashSet<usize> = component.iter().copied().collect();
    let mut ordered: Vec<usize> = component.to_vec();
    ordered.sort_unstable();

    let mut cycles = Vec::new();
    let mut truncated = false;

    for (position, &start) in ordered.iter().enumerate() {
        // Only vertices at or after the start participate, so every cycle is
        // rooted at its smallest member.
        let allowed: HashSet<usize> = ordered[position..].iter().copied().collect();

        let mut search = CycleSearch {
            adjacency,
            members: &members,
            allowed: &allowed,
            start,
            max_cycle_length,
            blocked: HashSet::default(),
            block_map: foldhash::HashMap::default(),
            path: Vec::new(),
            cycles: &mut cycles,
            truncated: &mut truncated,
        };

        search.path.push(start);
        search.blocked.insert(start);
        search.circuit(start);
    }

    (cycles, truncated)
}

struct CycleSearch<'a> {
    adjacency: &'a [Vec<usize>],
    members: &'a HashSet<usize>,
    allowed: &'a HashSet<usize>,
    start: usize,
    max_cycle_length: usize,
    blocked: HashSet<usize>,
    block_map: foldhash::HashMap<usize, HashSet<usize>>,
    path: Vec<usize>,
    cycles: &'a mut Vec<Vec<usize>>,
    truncated: &'a mut bool,
}

impl CycleSearch<'_> {
    fn circuit(&mut self, node: usize) -> bool {
        let mut found = false;

        let neighbors: Vec<usize> = self.adjacency[node]
            .iter()
            .copied()
            .filter(|neighbor| self.members.contains(neighbor) && self.allowed.contains(neighbor))
            .collect();

        for neighbor in neighbors {
            if neighbor == self.start {
                self.cycles.push(self.path.clone());
                found = true;
                continue;
            }

            if self.blocked.contains(&neighbor) {
                continue;
            }

            if self.path.len() >= self.max_cycle_length {
                *self.truncated = true;
                continue;
            }

            self.path.push(neighbor);
            self.blocked.insert(neighbor);

            if self.circuit(neighbor) {
                found = true;
            }

            self.path.pop();
        }

        if found {
            self.unblock(node);
        } else {
            let adjacency = self.adjacency;
            let members = self.members;
            let allowed = self.allowed;
            for neighbor in &adjacency[node] {
                if members.contains(neighbor) && allowed.contains(neighbor) {
                    self.block_map.entry(*neighbor).or_default().insert(node);
                }
            }
        }

        found
    }

    fn unblock(&mut self, node: usize) {
        self.blocked.remove(&node);

        if let Some(dependents) = self.block_map.remove(&node) {
            for dependent in dependents {
                if self.blocked.contains(&dependent) {
                    self.unblock(dependent);
                }
            }
        }
    }
}
