//! Duplicate clusters as the transitive closure of pairwise matches.

/// Union-find over record indices, union by rank with path compression.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    /// Every index in `0..size` starts as its own singleton.
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

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

    /// Merges the sets holding `left` and `right`. Returns false when they
    /// were already joined.
    pub fn union(&mut self, left: usize, right: usize) -> bool {
        let left_root = self.find(left);
        let right_root = self.find(right);

        if left_root == right_root {
            return false;
        }

        let left_rank = self.rank[left_root];
        let right_rank = self.rank[right_root];

        if left_rank < right_rank {
            self.parent[left_root] = right_root;
        } else if left_rank > right_rank {
            self.parent[right_root] = left_root;
        } else {
            self.parent[right_root] = left_root;
            self.rank[left_root] += 1;
        }
        true
    }

    /// Reads off the partition. Clusters are ordered by their lowest member
    /// and members ascend, so the output does not depend on union order.
    pub fn into_clusters(mut self) -> Vec<Vec<usize>> {
        let mut slot_of_root: Vec<Option<usize>> = vec![None; self.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();

        for idx in 0..self.len() {
            let root = self.find(idx);
            match slot_of_root[root] {
                Some(slot) => clusters[slot].push(idx),
                None => {
                    slot_of_root[root] = Some(clusters.len());
                    clusters.push(vec![idx]);
                }
            }
        }

        clusters
    }
}

/// Partition of `size` records induced by `pairs`.
pub fn resolve_clusters<I>(size: usize, pairs: I) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut dsu = DisjointSet::new(size);
    for (left, right) in pairs {
        dsu.union(left, right);
    }
    dsu.into_clusters()
}
