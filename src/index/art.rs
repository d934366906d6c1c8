//! Adaptive radix trie over token bytes.
//!
//! Nodes live in an arena and reference each other through `u32` ids, so
//! the trie is a flat `Vec` with a free-list instead of a web of owned
//! pointers. Inner nodes use adaptive fanout (4 / 16 / 48 / 256 slots)
//! with path compression; leaves store the full key plus its [`Postings`]
//! and are reached through a terminating NUL byte appended to every key,
//! which guarantees no stored key is a prefix of another.
//!
//! Lookup modes:
//! - exact key lookup
//! - lexicographic enumeration under a prefix
//! - bounded edit-distance search with candidate ranking (see
//!   [`Art::fuzzy_search`])

use crate::index::postings::Postings;

pub type NodeId = u32;

const NIL: NodeId = u32::MAX;

/// How fuzzy-search candidates are ranked when more exist than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenOrdering {
    /// Most documents first
    #[default]
    Frequency,
    /// Highest postings max_score first
    MaxScore,
}

/// A terminal node: full key (with trailing NUL) and its postings.
#[derive(Debug)]
pub struct Leaf {
    key: Box<[u8]>,
    pub postings: Postings,
}

impl Leaf {
    /// Token bytes, without the internal terminator.
    pub fn token(&self) -> &[u8] {
        &self.key[..self.key.len() - 1]
    }
}

#[derive(Debug)]
struct Inner {
    prefix: Vec<u8>,
    children: Children,
}

#[derive(Debug)]
enum Node {
    Leaf(Leaf),
    Inner(Inner),
    /// Free-list entry pointing at the next free slot
    Free(NodeId),
}

#[derive(Debug)]
enum Children {
    Node4 {
        keys: [u8; 4],
        ptrs: [NodeId; 4],
        len: u8,
    },
    Node16 {
        keys: [u8; 16],
        ptrs: [NodeId; 16],
        len: u8,
    },
    Node48 {
        // index[byte] = slot + 1, 0 = absent
        index: Box<[u8; 256]>,
        ptrs: [NodeId; 48],
        len: u8,
    },
    Node256 {
        ptrs: Box<[NodeId; 256]>,
        len: u16,
    },
}

impl Children {
    fn empty() -> Self {
        Children::Node4 {
            keys: [0; 4],
            ptrs: [NIL; 4],
            len: 0,
        }
    }

    fn len(&self) -> usize {
        match self {
            Children::Node4 { len, .. } | Children::Node16 { len, .. } => *len as usize,
            Children::Node48 { len, .. } => *len as usize,
            Children::Node256 { len, .. } => *len as usize,
        }
    }

    fn find(&self, byte: u8) -> Option<NodeId> {
        match self {
            Children::Node4 { keys, ptrs, len } => keys[..*len as usize]
                .iter()
                .position(|&k| k == byte)
                .map(|i| ptrs[i]),
            Children::Node16 { keys, ptrs, len } => keys[..*len as usize]
                .iter()
                .position(|&k| k == byte)
                .map(|i| ptrs[i]),
            Children::Node48 { index, ptrs, .. } => {
                let slot = index[byte as usize];
                if slot == 0 {
                    None
                } else {
                    Some(ptrs[slot as usize - 1])
                }
            }
            Children::Node256 { ptrs, .. } => {
                let p = ptrs[byte as usize];
                if p == NIL {
                    None
                } else {
                    Some(p)
                }
            }
        }
    }

    fn replace(&mut self, byte: u8, id: NodeId) {
        match self {
            Children::Node4 { keys, ptrs, len } => {
                let i = keys[..*len as usize].iter().position(|&k| k == byte).unwrap();
                ptrs[i] = id;
            }
            Children::Node16 { keys, ptrs, len } => {
                let i = keys[..*len as usize].iter().position(|&k| k == byte).unwrap();
                ptrs[i] = id;
            }
            Children::Node48 { index, ptrs, .. } => {
                ptrs[index[byte as usize] as usize - 1] = id;
            }
            Children::Node256 { ptrs, .. } => {
                ptrs[byte as usize] = id;
            }
        }
    }

    /// Insert a new edge, growing the node representation when full.
    fn add(&mut self, byte: u8, id: NodeId) {
        match self {
            Children::Node4 { keys, ptrs, len } => {
                if (*len as usize) < 4 {
                    // keep keys sorted for lexicographic iteration
                    let mut i = *len as usize;
                    while i > 0 && keys[i - 1] > byte {
                        keys[i] = keys[i - 1];
                        ptrs[i] = ptrs[i - 1];
                        i -= 1;
                    }
                    keys[i] = byte;
                    ptrs[i] = id;
                    *len += 1;
                    return;
                }
                let mut new_keys = [0u8; 16];
                let mut new_ptrs = [NIL; 16];
                new_keys[..4].copy_from_slice(keys);
                new_ptrs[..4].copy_from_slice(ptrs);
                *self = Children::Node16 {
                    keys: new_keys,
                    ptrs: new_ptrs,
                    len: 4,
                };
                self.add(byte, id);
            }
            Children::Node16 { keys, ptrs, len } => {
                if (*len as usize) < 16 {
                    let mut i = *len as usize;
                    while i > 0 && keys[i - 1] > byte {
                        keys[i] = keys[i - 1];
                        ptrs[i] = ptrs[i - 1];
                        i -= 1;
                    }
                    keys[i] = byte;
                    ptrs[i] = id;
                    *len += 1;
                    return;
                }
                let mut index = Box::new([0u8; 256]);
                let mut new_ptrs = [NIL; 48];
                for i in 0..16 {
                    index[keys[i] as usize] = (i + 1) as u8;
                    new_ptrs[i] = ptrs[i];
                }
                *self = Children::Node48 {
                    index,
                    ptrs: new_ptrs,
                    len: 16,
                };
                self.add(byte, id);
            }
            Children::Node48 { index, ptrs, len } => {
                if (*len as usize) < 48 {
                    let slot = ptrs.iter().position(|&p| p == NIL).unwrap();
                    ptrs[slot] = id;
                    index[byte as usize] = (slot + 1) as u8;
                    *len += 1;
                    return;
                }
                let mut new_ptrs = Box::new([NIL; 256]);
                for b in 0..256 {
                    let slot = index[b];
                    if slot != 0 {
                        new_ptrs[b] = ptrs[slot as usize - 1];
                    }
                }
                *self = Children::Node256 {
                    ptrs: new_ptrs,
                    len: 48,
                };
                self.add(byte, id);
            }
            Children::Node256 { ptrs, len } => {
                ptrs[byte as usize] = id;
                *len += 1;
            }
        }
    }

    /// Remove an edge, shrinking the representation when underfull.
    fn remove(&mut self, byte: u8) {
        match self {
            Children::Node4 { keys, ptrs, len } => {
                if let Some(i) = keys[..*len as usize].iter().position(|&k| k == byte) {
                    for j in i..*len as usize - 1 {
                        keys[j] = keys[j + 1];
                        ptrs[j] = ptrs[j + 1];
                    }
                    *len -= 1;
                }
            }
            Children::Node16 { keys, ptrs, len } => {
                if let Some(i) = keys[..*len as usize].iter().position(|&k| k == byte) {
                    for j in i..*len as usize - 1 {
                        keys[j] = keys[j + 1];
                        ptrs[j] = ptrs[j + 1];
                    }
                    *len -= 1;
                }
                if *len <= 3 {
                    let mut new_keys = [0u8; 4];
                    let mut new_ptrs = [NIL; 4];
                    new_keys[..*len as usize].copy_from_slice(&keys[..*len as usize]);
                    new_ptrs[..*len as usize].copy_from_slice(&ptrs[..*len as usize]);
                    *self = Children::Node4 {
                        keys: new_keys,
                        ptrs: new_ptrs,
                        len: *len,
                    };
                }
            }
            Children::Node48 { index, ptrs, len } => {
                let slot = index[byte as usize];
                if slot != 0 {
                    ptrs[slot as usize - 1] = NIL;
                    index[byte as usize] = 0;
                    *len -= 1;
                }
                if *len <= 12 {
                    let mut keys = [0u8; 16];
                    let mut new_ptrs = [NIL; 16];
                    let mut n = 0;
                    for b in 0..256 {
                        let slot = index[b];
                        if slot != 0 {
                            keys[n] = b as u8;
                            new_ptrs[n] = ptrs[slot as usize - 1];
                            n += 1;
                        }
                    }
                    *self = Children::Node16 {
                        keys,
                        ptrs: new_ptrs,
                        len: n as u8,
                    };
                }
            }
            Children::Node256 { ptrs, len } => {
                if ptrs[byte as usize] != NIL {
                    ptrs[byte as usize] = NIL;
                    *len -= 1;
                }
                if *len <= 40 {
                    let mut index = Box::new([0u8; 256]);
                    let mut new_ptrs = [NIL; 48];
                    let mut n = 0;
                    for b in 0..256 {
                        if ptrs[b] != NIL {
                            index[b] = (n + 1) as u8;
                            new_ptrs[n as usize] = ptrs[b];
                            n += 1;
                        }
                    }
                    *self = Children::Node48 {
                        index,
                        ptrs: new_ptrs,
                        len: n,
                    };
                }
            }
        }
    }

    /// Edges in ascending byte order.
    fn sorted_edges(&self) -> Vec<(u8, NodeId)> {
        match self {
            Children::Node4 { keys, ptrs, len } => (0..*len as usize)
                .map(|i| (keys[i], ptrs[i]))
                .collect(),
            Children::Node16 { keys, ptrs, len } => (0..*len as usize)
                .map(|i| (keys[i], ptrs[i]))
                .collect(),
            Children::Node48 { index, ptrs, .. } => (0..256usize)
                .filter(|&b| index[b] != 0)
                .map(|b| (b as u8, ptrs[index[b] as usize - 1]))
                .collect(),
            Children::Node256 { ptrs, .. } => (0..256usize)
                .filter(|&b| ptrs[b] != NIL)
                .map(|b| (b as u8, ptrs[b]))
                .collect(),
        }
    }
}

/// Arena-backed adaptive radix trie mapping tokens to postings.
#[derive(Debug)]
pub struct Art {
    nodes: Vec<Node>,
    root: NodeId,
    free_head: NodeId,
    num_leaves: usize,
}

impl Default for Art {
    fn default() -> Self {
        Self::new()
    }
}

impl Art {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NIL,
            free_head: NIL,
            num_leaves: 0,
        }
    }

    pub fn num_tokens(&self) -> usize {
        self.num_leaves
    }

    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    pub fn leaf(&self, id: NodeId) -> &Leaf {
        match &self.nodes[id as usize] {
            Node::Leaf(leaf) => leaf,
            _ => panic!("node {id} is not a leaf"),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut Leaf {
        match &mut self.nodes[id as usize] {
            Node::Leaf(leaf) => leaf,
            _ => panic!("node {id} is not a leaf"),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if self.free_head != NIL {
            let id = self.free_head;
            self.free_head = match self.nodes[id as usize] {
                Node::Free(next) => next,
                _ => unreachable!("free list points at live node"),
            };
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as NodeId
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id as usize] = Node::Free(self.free_head);
        self.free_head = id;
    }

    fn internal_key(token: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(token.len() + 1);
        key.extend_from_slice(token);
        key.push(0);
        key
    }

    /// Add one document's offsets under `token`, creating the leaf on
    /// first sight of the token.
    pub fn upsert(&mut self, token: &[u8], seq_id: u32, offsets: &[u32], score: i64) {
        let key = Self::internal_key(token);
        if self.root == NIL {
            let mut postings = Postings::new();
            postings.upsert(seq_id, offsets, score);
            self.root = self.alloc(Node::Leaf(Leaf {
                key: key.into_boxed_slice(),
                postings,
            }));
            self.num_leaves += 1;
            return;
        }
        self.root = self.insert_rec(self.root, &key, 0, seq_id, offsets, score);
    }

    fn new_leaf(&mut self, key: &[u8], seq_id: u32, offsets: &[u32], score: i64) -> NodeId {
        let mut postings = Postings::new();
        postings.upsert(seq_id, offsets, score);
        self.num_leaves += 1;
        self.alloc(Node::Leaf(Leaf {
            key: key.to_vec().into_boxed_slice(),
            postings,
        }))
    }

    fn insert_rec(
        &mut self,
        node_id: NodeId,
        key: &[u8],
        depth: usize,
        seq_id: u32,
        offsets: &[u32],
        score: i64,
    ) -> NodeId {
        match &self.nodes[node_id as usize] {
            Node::Leaf(leaf) => {
                if *leaf.key == *key {
                    self.leaf_mut(node_id).postings.upsert(seq_id, offsets, score);
                    return node_id;
                }

                let existing = &leaf.key[depth..];
                let incoming = &key[depth..];
                let common = lcp(existing, incoming);
                // Trailing NULs guarantee neither side is exhausted here
                let existing_edge = existing[common];
                let incoming_edge = incoming[common];
                let prefix = incoming[..common].to_vec();

                let new_leaf = self.new_leaf(key, seq_id, offsets, score);
                let mut children = Children::empty();
                children.add(existing_edge, node_id);
                children.add(incoming_edge, new_leaf);
                self.alloc(Node::Inner(Inner { prefix, children }))
            }
            Node::Inner(inner) => {
                let prefix = inner.prefix.clone();
                let rest = &key[depth..];
                let common = lcp(&prefix, rest);

                if common < prefix.len() {
                    // Split the compressed path
                    let parent_prefix = prefix[..common].to_vec();
                    let old_edge = prefix[common];
                    let new_edge = rest[common];

                    if let Node::Inner(inner) = &mut self.nodes[node_id as usize] {
                        inner.prefix = prefix[common + 1..].to_vec();
                    }

                    let new_leaf = self.new_leaf(key, seq_id, offsets, score);
                    let mut children = Children::empty();
                    children.add(old_edge, node_id);
                    children.add(new_edge, new_leaf);
                    return self.alloc(Node::Inner(Inner {
                        prefix: parent_prefix,
                        children,
                    }));
                }

                let edge = rest[common];
                let next_depth = depth + common + 1;
                match inner.children.find(edge) {
                    Some(child) => {
                        let new_child =
                            self.insert_rec(child, key, next_depth, seq_id, offsets, score);
                        if new_child != child {
                            if let Node::Inner(inner) = &mut self.nodes[node_id as usize] {
                                inner.children.replace(edge, new_child);
                            }
                        }
                    }
                    None => {
                        let new_leaf = self.new_leaf(key, seq_id, offsets, score);
                        if let Node::Inner(inner) = &mut self.nodes[node_id as usize] {
                            inner.children.add(edge, new_leaf);
                        }
                    }
                }
                node_id
            }
            Node::Free(_) => unreachable!("descended into freed node"),
        }
    }

    /// Exact lookup.
    pub fn get(&self, token: &[u8]) -> Option<&Postings> {
        self.find_leaf(token).map(|id| &self.leaf(id).postings)
    }

    pub fn get_mut(&mut self, token: &[u8]) -> Option<&mut Postings> {
        match self.find_leaf(token) {
            Some(id) => Some(&mut self.leaf_mut(id).postings),
            None => None,
        }
    }

    /// Leaf id for an exact token, if indexed.
    pub fn find_leaf(&self, token: &[u8]) -> Option<NodeId> {
        if self.root == NIL {
            return None;
        }
        let key = Self::internal_key(token);
        let mut node_id = self.root;
        let mut depth = 0usize;
        loop {
            match &self.nodes[node_id as usize] {
                Node::Leaf(leaf) => {
                    return if *leaf.key == *key { Some(node_id) } else { None };
                }
                Node::Inner(inner) => {
                    let rest = &key[depth..];
                    if rest.len() <= inner.prefix.len()
                        || rest[..inner.prefix.len()] != inner.prefix[..]
                    {
                        return None;
                    }
                    depth += inner.prefix.len();
                    match inner.children.find(key[depth]) {
                        Some(child) => {
                            node_id = child;
                            depth += 1;
                        }
                        None => return None,
                    }
                }
                Node::Free(_) => unreachable!("descended into freed node"),
            }
        }
    }

    /// Delete a token's leaf outright.
    pub fn delete(&mut self, token: &[u8]) -> bool {
        if self.root == NIL {
            return false;
        }
        let key = Self::internal_key(token);

        // Walk down remembering the parent chain
        let mut path: Vec<(NodeId, u8)> = Vec::new();
        let mut node_id = self.root;
        let mut depth = 0usize;
        loop {
            match &self.nodes[node_id as usize] {
                Node::Leaf(leaf) => {
                    if *leaf.key != *key {
                        return false;
                    }
                    break;
                }
                Node::Inner(inner) => {
                    let rest = &key[depth..];
                    if rest.len() <= inner.prefix.len()
                        || rest[..inner.prefix.len()] != inner.prefix[..]
                    {
                        return false;
                    }
                    depth += inner.prefix.len();
                    let edge = key[depth];
                    match inner.children.find(edge) {
                        Some(child) => {
                            path.push((node_id, edge));
                            node_id = child;
                            depth += 1;
                        }
                        None => return false,
                    }
                }
                Node::Free(_) => unreachable!("descended into freed node"),
            }
        }

        self.release(node_id);
        self.num_leaves -= 1;

        let Some((parent_id, edge)) = path.pop() else {
            self.root = NIL;
            return true;
        };

        if let Node::Inner(inner) = &mut self.nodes[parent_id as usize] {
            inner.children.remove(edge);
        }

        // Collapse a single-child inner node into its surviving child
        let (remaining, survivor_edge, survivor) =
            match &self.nodes[parent_id as usize] {
                Node::Inner(inner) => {
                    let edges = inner.children.sorted_edges();
                    (edges.len(), edges.first().map(|e| e.0), edges.first().map(|e| e.1))
                }
                _ => unreachable!(),
            };

        if remaining == 1 {
            let survivor = survivor.unwrap();
            let survivor_edge = survivor_edge.unwrap();
            let merged = match &self.nodes[survivor as usize] {
                Node::Inner(child) => {
                    let mut prefix = match &self.nodes[parent_id as usize] {
                        Node::Inner(parent) => parent.prefix.clone(),
                        _ => unreachable!(),
                    };
                    prefix.push(survivor_edge);
                    prefix.extend_from_slice(&child.prefix);
                    Some(prefix)
                }
                // A lone leaf carries its full key; just hoist it
                Node::Leaf(_) => None,
                Node::Free(_) => unreachable!(),
            };

            if let Some(prefix) = merged {
                if let Node::Inner(child) = &mut self.nodes[survivor as usize] {
                    child.prefix = prefix;
                }
            }

            self.release(parent_id);
            match path.pop() {
                Some((grand_id, grand_edge)) => {
                    if let Node::Inner(grand) = &mut self.nodes[grand_id as usize] {
                        grand.children.replace(grand_edge, survivor);
                    }
                }
                None => self.root = survivor,
            }
        }

        true
    }

    /// Remove one document from a token's postings, deleting the leaf when
    /// the postings drain empty. Returns true when the document was found.
    pub fn remove_doc(&mut self, token: &[u8], seq_id: u32) -> bool {
        let Some(leaf_id) = self.find_leaf(token) else {
            return false;
        };
        let leaf = self.leaf_mut(leaf_id);
        if !leaf.postings.remove(seq_id) {
            return false;
        }
        if leaf.postings.num_docs() == 0 {
            self.delete(token);
        }
        true
    }

    /// All leaves whose token starts with `prefix`, in lexicographic order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.root == NIL {
            return out;
        }

        let mut node_id = self.root;
        let mut depth = 0usize;
        loop {
            match &self.nodes[node_id as usize] {
                Node::Leaf(leaf) => {
                    if leaf.token().len() >= prefix.len()
                        && &leaf.token()[..prefix.len()] == prefix
                    {
                        out.push(node_id);
                    }
                    return out;
                }
                Node::Inner(inner) => {
                    let wanted = &prefix[depth..];
                    if wanted.len() <= inner.prefix.len() {
                        if inner.prefix[..wanted.len()] == wanted[..] {
                            self.collect_leaves(node_id, &mut out);
                        }
                        return out;
                    }
                    if wanted[..inner.prefix.len()] != inner.prefix[..] {
                        return out;
                    }
                    depth += inner.prefix.len();
                    match inner.children.find(prefix[depth]) {
                        Some(child) => {
                            node_id = child;
                            depth += 1;
                        }
                        None => return out,
                    }
                }
                Node::Free(_) => unreachable!("descended into freed node"),
            }
        }
    }

    fn collect_leaves(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        match &self.nodes[node_id as usize] {
            Node::Leaf(_) => out.push(node_id),
            Node::Inner(inner) => {
                for (_, child) in inner.children.sorted_edges() {
                    self.collect_leaves(child, out);
                }
            }
            Node::Free(_) => unreachable!("descended into freed node"),
        }
    }

    /// Bounded edit-distance candidate lookup.
    ///
    /// Returns up to `max_words` leaves whose accepted cost against
    /// `token` lies in `min_cost..=max_cost`, ranked by `ordering` with
    /// lexicographic tie-break on the key.
    ///
    /// The accepted cost of key K is the minimum of:
    /// - the Levenshtein distance lev(K, Q),
    /// - 1 + lev(K, P) for any proper prefix P of the query (a truncated
    ///   query tail costs one unit),
    /// - 1 + lev(J, Q) for any proper prefix J of the key (a key
    ///   extending past the query costs one unit; zero in prefix mode).
    pub fn fuzzy_search(
        &self,
        token: &[u8],
        min_cost: u32,
        max_cost: u32,
        max_words: usize,
        ordering: TokenOrdering,
        prefix: bool,
    ) -> Vec<NodeId> {
        if self.root == NIL || token.is_empty() {
            return Vec::new();
        }

        let tail_penalty = if prefix { 0 } else { 1 };
        let row: Vec<u32> = (0..=token.len() as u32).collect();
        let mut found: Vec<(u32, NodeId)> = Vec::new();

        self.fuzzy_rec(
            self.root,
            0,
            &row,
            u32::MAX,
            token,
            tail_penalty,
            min_cost,
            max_cost,
            &mut found,
        );

        found.sort_by(|&(_, a), &(_, b)| {
            let la = self.leaf(a);
            let lb = self.leaf(b);
            let (score_a, score_b) = match ordering {
                TokenOrdering::Frequency => (la.postings.num_docs() as i64, lb.postings.num_docs() as i64),
                TokenOrdering::MaxScore => (la.postings.max_score, lb.postings.max_score),
            };
            score_b.cmp(&score_a).then_with(|| la.token().cmp(lb.token()))
        });
        found.truncate(max_words);
        found.into_iter().map(|(_, id)| id).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn fuzzy_rec(
        &self,
        node_id: NodeId,
        depth: usize,
        row: &[u32],
        best_tail: u32,
        query: &[u8],
        tail_penalty: u32,
        min_cost: u32,
        max_cost: u32,
        found: &mut Vec<(u32, NodeId)>,
    ) {
        let m = query.len();
        let row_min = *row.iter().min().unwrap();

        if row_min > max_cost {
            // The DP can no longer qualify anything below; the whole
            // subtree may still match through an earlier accepted prefix.
            if best_tail >= min_cost && best_tail <= max_cost {
                let mut leaves = Vec::new();
                self.collect_leaves(node_id, &mut leaves);
                found.extend(leaves.into_iter().map(|id| (best_tail, id)));
            }
            return;
        }

        match &self.nodes[node_id as usize] {
            Node::Leaf(leaf) => {
                let mut current = row.to_vec();
                let mut tail = best_tail;
                // depth lands past the key end when the leaf was reached
                // through its NUL edge; nothing remains to process then
                let end = leaf.key.len() - 1;
                let remaining: &[u8] = if depth >= end { &[] } else { &leaf.key[depth..end] };
                for &b in remaining {
                    tail = tail.min(current[m].saturating_add(tail_penalty));
                    current = advance_row(&current, b, query);
                    if *current.iter().min().unwrap() > max_cost {
                        break;
                    }
                }

                let dp_cost = if *current.iter().min().unwrap() > max_cost {
                    u32::MAX
                } else {
                    // key may also stop short of the full query tail
                    let truncated = current[..m]
                        .iter()
                        .min()
                        .map(|&c| c.saturating_add(1))
                        .unwrap_or(u32::MAX);
                    current[m].min(truncated)
                };

                let cost = dp_cost.min(tail);
                if cost >= min_cost && cost <= max_cost {
                    found.push((cost, node_id));
                }
            }
            Node::Inner(inner) => {
                let mut current = row.to_vec();
                let mut tail = best_tail;
                for &b in &inner.prefix {
                    tail = tail.min(current[m].saturating_add(tail_penalty));
                    current = advance_row(&current, b, query);
                    if *current.iter().min().unwrap() > max_cost {
                        if tail >= min_cost && tail <= max_cost {
                            let mut leaves = Vec::new();
                            self.collect_leaves(node_id, &mut leaves);
                            found.extend(leaves.into_iter().map(|id| (tail, id)));
                        }
                        return;
                    }
                }

                for (edge, child) in inner.children.sorted_edges() {
                    if edge == 0 {
                        // NUL edge: not part of the token alphabet; the
                        // child leaf ends exactly here
                        self.fuzzy_rec(
                            child,
                            depth + inner.prefix.len() + 1,
                            &current,
                            tail,
                            query,
                            tail_penalty,
                            min_cost,
                            max_cost,
                            found,
                        );
                        continue;
                    }
                    let next_tail = tail.min(current[m].saturating_add(tail_penalty));
                    let next = advance_row(&current, edge, query);
                    self.fuzzy_rec(
                        child,
                        depth + inner.prefix.len() + 1,
                        &next,
                        next_tail,
                        query,
                        tail_penalty,
                        min_cost,
                        max_cost,
                        found,
                    );
                }
            }
            Node::Free(_) => unreachable!("descended into freed node"),
        }
    }
}

/// One Levenshtein DP step: extend the candidate by byte `b`.
fn advance_row(row: &[u32], b: u8, query: &[u8]) -> Vec<u32> {
    let mut next = Vec::with_capacity(row.len());
    next.push(row[0] + 1);
    for j in 1..row.len() {
        let substitute = row[j - 1] + u32::from(query[j - 1] != b);
        let delete = row[j] + 1;
        let insert = next[j - 1] + 1;
        next.push(substitute.min(delete).min(insert));
    }
    next
}

fn lcp(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
