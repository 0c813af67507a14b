//! Disjoint-set forest over entity indices.
//!
//! Tracks mini-cluster membership during initialization. Each root keeps
//! its member list so that merged aggregates can be written back to every
//! member eagerly.

/// Union-find with union by size and path compression.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            members: (0..n).map(|i| vec![i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of `x`'s set.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Merges the sets of `a` and `b` and returns the new root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (big, small) = if self.members[ra].len() >= self.members[rb].len() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        let moved = std::mem::take(&mut self.members[small]);
        self.members[big].extend(moved);
        big
    }

    /// Members of the set rooted at `root`. Empty for non-roots.
    pub fn members(&self, root: usize) -> &[usize] {
        &self.members[root]
    }

    /// Size of `x`'s set.
    pub fn set_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.members[root].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_are_disjoint() {
        let mut ds = DisjointSet::new(3);
        assert!(!ds.same(0, 1));
        assert_eq!(ds.set_size(2), 1);
    }

    #[test]
    fn union_merges_members() {
        let mut ds = DisjointSet::new(5);
        ds.union(0, 1);
        let root = ds.union(3, 1);
        assert!(ds.same(0, 3));
        assert!(!ds.same(0, 4));
        let mut members = ds.members(root).to_vec();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 3]);
        assert_eq!(ds.set_size(4), 1);
    }

    #[test]
    fn union_of_same_set_is_a_no_op() {
        let mut ds = DisjointSet::new(2);
        let r = ds.union(0, 1);
        assert_eq!(ds.union(1, 0), r);
        assert_eq!(ds.set_size(0), 2);
    }
}
