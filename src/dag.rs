use smallvec::SmallVec;
use std::slice::Iter;

/// An arena-backed Directed Acyclic Graph (DAG).
///
/// The search structure of a trapezoidal map is a DAG rather than a tree:
/// when a segment crosses several trapezoids, the faces extended across the
/// crossing keep a single leaf that ends up reachable through every one of
/// the rewritten decision nodes. Expressing that with owned pointers would be
/// awkward in Rust, so nodes live in a flat arena and refer to each other by
/// [`usize`] index. Indices are stable because nodes are never removed; a
/// "deleted" leaf is rewritten in place into the inner node that replaces it,
/// which also means every path that used to reach the leaf now reaches its
/// replacement without any parent bookkeeping.
///
/// Dropping the arena frees every node exactly once, however many incoming
/// edges it has.
#[derive(Debug, Default)]
pub(crate) struct Dag<T> {
    arena: Vec<Node<T>>,
}

impl<T> Dag<T> {
    /// Constructs a new empty DAG.
    pub(crate) fn new() -> Self {
        Dag { arena: Vec::new() }
    }

    /// Add a new node to the DAG. Returns the index of the node.
    pub(crate) fn add(&mut self, data: T) -> usize {
        let idx = self.arena.len();
        self.arena.push(Node::new(data));
        idx
    }

    /// Get a shared reference to the node with index `idx`, if it exists.
    pub(crate) fn get(&self, idx: usize) -> Option<&Node<T>> {
        self.arena.get(idx)
    }

    /// Get an exclusive reference to the node with index `idx`, if it exists.
    fn get_mut(&mut self, idx: usize) -> Option<&mut Node<T>> {
        self.arena.get_mut(idx)
    }

    /// An iterator over the DAG's nodes.
    pub(crate) fn iter(&self) -> Iter<'_, Node<T>> {
        self.arena.iter()
    }

    /// Gets the given index’ corresponding entry in the DAG for in-place manipulation.
    pub(crate) fn entry(&mut self, idx: usize) -> Entry<'_, T> {
        Entry { idx, dag: self }
    }

    /// Length of the longest path from the root (node 0) to any leaf.
    ///
    /// A node shared between several paths is evaluated once thanks to the
    /// memo, so this stays linear in the number of nodes.
    pub(crate) fn max_depth(&self) -> usize {
        if self.arena.is_empty() {
            return 0;
        }
        let mut memo: Vec<Option<usize>> = vec![None; self.arena.len()];
        let mut stack = vec![0];
        while let Some(&idx) = stack.last() {
            if memo[idx].is_some() {
                stack.pop();
                continue;
            }
            let mut depth = 0;
            let mut ready = true;
            for &child in &self.arena[idx].children {
                match memo[child] {
                    Some(d) => depth = depth.max(d + 1),
                    None => {
                        stack.push(child);
                        ready = false;
                    }
                }
            }
            if ready {
                memo[idx] = Some(depth);
                stack.pop();
            }
        }
        memo[0].expect("The root's depth should have been computed")
    }
}

/// A node of the DAG.
#[derive(Debug, Default)]
pub(crate) struct Node<T> {
    pub(crate) data: T,
    pub(crate) children: SmallVec<[usize; 2]>,
}

impl<T> Node<T> {
    fn new(data: T) -> Self {
        Node {
            data,
            children: SmallVec::new(),
        }
    }
}

/// A view into a single entry in a DAG, which may or may not exist yet.
pub(crate) struct Entry<'a, T> {
    idx: usize,
    dag: &'a mut Dag<T>,
}

impl<T> Entry<'_, T> {
    /// Creates and appends a new [`Node`] with given data to the entry, if it exists.
    pub(crate) fn append_new(&mut self, data: T) -> Option<usize> {
        let dag = &mut self.dag;
        let new_idx = dag.add(data);
        self.append(new_idx)
    }

    /// Appends an existing [`Node`] to the entry, if it exists.
    pub(crate) fn append(&mut self, idx: usize) -> Option<usize> {
        if self.dag.get(idx).is_some() {
            self.dag.arena[self.idx].children.push(idx);
            Some(idx)
        } else {
            None
        }
    }

    pub(crate) fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut T),
    {
        if let Some(node) = self.dag.get_mut(self.idx) {
            f(&mut node.data);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl<T> Dag<T> {
        /// Returns the number of nodes in the DAG.
        pub fn count(&self) -> usize {
            self.arena.len()
        }
    }

    #[test]
    fn create_empty_dag() {
        let dag = Dag::<usize>::new();

        assert_eq!(dag.count(), 0);
        assert_eq!(dag.max_depth(), 0);
    }

    #[test]
    fn add_node_to_dag() {
        let mut dag = Dag::new();

        let idx_42 = dag.add(42);
        assert_eq!(idx_42, 0);
        assert_eq!(dag.count(), 1);
        assert_eq!(dag.max_depth(), 0);

        let idx_314 = dag.entry(idx_42).append_new(314).unwrap();
        assert_eq!(idx_314, 1);
        assert_eq!(dag.count(), 2);
        assert_eq!(dag.max_depth(), 1);
    }

    #[test]
    fn appending_missing_node_is_a_noop() {
        let mut dag = Dag::new();
        let root = dag.add(0);

        assert_eq!(dag.entry(root).append(7), None);
        assert!(dag.get(root).unwrap().children.is_empty());
    }

    #[test]
    fn rewrite_node_in_place() {
        let mut dag = Dag::new();
        let root = dag.add(1);

        dag.entry(root).and_modify(|data| *data = 2);

        assert_eq!(dag.get(root).unwrap().data, 2);
    }

    #[test]
    fn max_depth_follows_the_longest_path_through_a_shared_node() {
        // root -> a -> shared and root -> shared
        let mut dag = Dag::new();
        let root = dag.add(0);
        let a = dag.entry(root).append_new(1).unwrap();
        let shared = dag.entry(a).append_new(2).unwrap();
        dag.entry(root).append(shared);

        assert_eq!(dag.max_depth(), 2);
    }

    #[test]
    fn dag_iter() {
        let mut dag = Dag::new();
        dag.add(42);
        dag.add(314);

        let values: Vec<usize> = dag.iter().map(|node| node.data).collect();

        assert_eq!(&values, &[42, 314]);
    }
}
