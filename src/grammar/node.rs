use std::hash::{Hash, Hasher};

/// A program tree: one [`Rule`] of a nonterminal applied to child trees.
///
/// A node with `rule: None` is _null_, a hole in a partial tree. The children of a node always
/// match the declared child nonterminals of its rule, in order.
///
/// `can_resample` pins a node: proposals and restarts never modify a pinned node, nor any
/// subtree containing one. Equality and hashing ignore it.
///
/// Every operation that indexes nodes ("the k'th resamplable node") uses pre-order: a node
/// comes before its children, and children are visited left to right. Nodes are located by
/// _paths_, the sequence of child indices from the root.
///
/// [`Rule`]: struct.Rule.html
#[derive(Debug, Clone)]
pub struct Node {
    /// Index of the nonterminal this node produces (see [`Grammar::nonterminal`]).
    ///
    /// [`Grammar::nonterminal`]: struct.Grammar.html#method.nonterminal
    pub nt: usize,
    /// Index of the rule within the nonterminal's rules, or `None` for a null node.
    pub rule: Option<usize>,
    pub children: Vec<Node>,
    pub can_resample: bool,
}
impl Node {
    pub fn new(nt: usize, rule: usize, children: Vec<Node>) -> Self {
        Node {
            nt,
            rule: Some(rule),
            children,
            can_resample: true,
        }
    }
    pub fn null(nt: usize) -> Self {
        Node {
            nt,
            rule: None,
            children: vec![],
            can_resample: true,
        }
    }
    pub fn is_null(&self) -> bool {
        self.rule.is_none()
    }
    /// Whether the tree has no null subtrees.
    pub fn is_complete(&self) -> bool {
        !self.is_null() && self.children.iter().all(Node::is_complete)
    }
    /// The number of nodes in the tree, null nodes included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Node::depth).max().unwrap_or(0)
    }
    /// Iterate over every node of the tree in pre-order.
    pub fn iter(&self) -> Preorder {
        Preorder { stack: vec![self] }
    }
    pub fn get(&self, path: &[usize]) -> Option<&Node> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get(i))
    }
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get_mut(i))
    }
    /// Replace the subtree at `path`, returning the old subtree.
    pub fn replace(&mut self, path: &[usize], subtree: Node) -> Option<Node> {
        self.get_mut(path)
            .map(|node| std::mem::replace(node, subtree))
    }
    /// Whether no node in this subtree is pinned.
    pub fn is_pin_free(&self) -> bool {
        self.can_resample && self.children.iter().all(Node::is_pin_free)
    }
    /// Whether proposals may rewrite this subtree: it is complete and nothing in it is pinned.
    pub fn is_resamplable(&self) -> bool {
        self.can_resample && !self.is_null() && self.children.iter().all(Node::is_resamplable)
    }
    /// Pin every node of this subtree.
    pub fn pin(&mut self) {
        self.can_resample = false;
        self.children.iter_mut().for_each(Node::pin)
    }
    /// Paths to the nodes that proposals may rewrite, in pre-order: complete nodes whose whole
    /// subtree is unpinned.
    pub fn resamplable_paths(&self) -> Vec<Vec<usize>> {
        let mut found = Vec::new();
        collect_resamplable(self, &mut Vec::new(), &mut found);
        found.into_iter().flatten().collect()
    }
    pub fn count_resamplable(&self) -> usize {
        count_resamplable(self).0
    }
    /// Paths to every node of the given nonterminal, in pre-order.
    pub fn paths_with_nonterminal(&self, nt: usize) -> Vec<Vec<usize>> {
        let mut found = Vec::new();
        collect_with_nonterminal(self, nt, &mut Vec::new(), &mut found);
        found
    }
    /// The first null node in pre-order.
    pub fn first_null_mut(&mut self) -> Option<&mut Node> {
        if self.is_null() {
            return Some(self);
        }
        self.children.iter_mut().find_map(Node::first_null_mut)
    }
    pub fn first_null(&self) -> Option<&Node> {
        self.iter().find(|node| node.is_null())
    }
}
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.nt == other.nt && self.rule == other.rule && self.children == other.children
    }
}
impl Eq for Node {}
impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nt.hash(state);
        self.rule.hash(state);
        self.children.hash(state);
    }
}

/// Pre-order traversal of a [`Node`].
///
/// [`Node`]: struct.Node.html
pub struct Preorder<'a> {
    stack: Vec<&'a Node>,
}
impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Node;
    fn next(&mut self) -> Option<&'a Node> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Returns whether the subtree is resamplable. Slots are reserved in pre-order and cleared
/// once a pinned or null descendant shows up.
fn collect_resamplable(
    node: &Node,
    path: &mut Vec<usize>,
    found: &mut Vec<Option<Vec<usize>>>,
) -> bool {
    let slot = found.len();
    found.push(Some(path.clone()));
    let mut free = node.can_resample && !node.is_null();
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        free &= collect_resamplable(child, path, found);
        path.pop();
    }
    if !free {
        found[slot] = None;
    }
    free
}

/// (resamplable nodes, subtree is resamplable)
fn count_resamplable(node: &Node) -> (usize, bool) {
    let mut count = 0;
    let mut free = node.can_resample && !node.is_null();
    for child in &node.children {
        let (c, f) = count_resamplable(child);
        count += c;
        free &= f;
    }
    if free {
        count += 1;
    }
    (count, free)
}

fn collect_with_nonterminal(
    node: &Node,
    nt: usize,
    path: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    if node.nt == nt {
        found.push(path.clone())
    }
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        collect_with_nonterminal(child, nt, path, found);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(rule: usize) -> Node {
        Node::new(0, rule, vec![])
    }

    #[test]
    fn preorder_visits_parents_first() {
        let t = Node::new(0, 2, vec![Node::new(0, 2, vec![leaf(0), leaf(1)]), leaf(1)]);
        let rules: Vec<_> = t.iter().map(|n| n.rule.unwrap()).collect();
        assert_eq!(rules, vec![2, 2, 0, 1, 1]);
        assert_eq!(t.count(), 5);
        assert_eq!(t.depth(), 3);
    }

    #[test]
    fn pinned_subtrees_are_not_resamplable() {
        let mut t = Node::new(0, 2, vec![Node::new(0, 2, vec![leaf(0), leaf(1)]), leaf(1)]);
        assert_eq!(t.count_resamplable(), 5);
        t.get_mut(&[0, 1]).unwrap().can_resample = false;
        // the root and [0] contain the pin, [0, 1] is the pin
        assert_eq!(t.resamplable_paths(), vec![vec![0, 0], vec![1]]);
        assert_eq!(t.count_resamplable(), 2);
    }

    #[test]
    fn equality_ignores_pins() {
        let a = Node::new(0, 1, vec![leaf(0)]);
        let mut b = a.clone();
        b.pin();
        assert_eq!(a, b);
    }
}
