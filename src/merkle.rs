//! Binary Merkle trees over content chunk hashes
//!
//! Used by the BMFF hash assertion to bind streamed `mdat` payloads: leaves
//! are digests of fixed- or variable-size chunks, interior nodes digest the
//! concatenation of their children, and an unpaired node at the top of a
//! layer is promoted unchanged (no duplication). A tree with a single leaf
//! has that leaf as its root.

use crate::{
    error::{Error, Result},
    hash::{hash_bytes, HashAlgorithm, Hasher},
};

/// Binary Merkle tree built over leaf hashes
///
/// Leaves are added with [`add_leaf`](Self::add_leaf) or
/// [`add_leaf_hash`](Self::add_leaf_hash); [`build`](Self::build) computes
/// the interior layers and seals the tree against further mutation.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    alg: HashAlgorithm,

    /// layers[0] = leaves; the last layer holds the single root
    layers: Vec<Vec<Vec<u8>>>,

    sealed: bool,
}

impl MerkleTree {
    /// Create an empty tree hashing with `alg`
    pub fn new(alg: HashAlgorithm) -> Self {
        Self {
            alg,
            layers: vec![Vec::new()],
            sealed: false,
        }
    }

    /// Hash `data` and append it as a leaf
    pub fn add_leaf(&mut self, data: &[u8]) -> Result<()> {
        let digest = hash_bytes(data, self.alg);
        self.add_leaf_hash(digest)
    }

    /// Append an externally computed leaf hash
    pub fn add_leaf_hash(&mut self, digest: Vec<u8>) -> Result<()> {
        if self.sealed {
            return Err(Error::TreeSealed);
        }
        self.layers[0].push(digest);
        Ok(())
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Leaf hashes in insertion order
    pub fn leaves(&self) -> &[Vec<u8>] {
        &self.layers[0]
    }

    /// Compute interior layers and seal the tree
    pub fn build(&mut self) -> Result<()> {
        if self.sealed {
            return Err(Error::TreeSealed);
        }
        if self.layers[0].is_empty() {
            return Err(Error::Other("merkle tree has no leaves".to_string()));
        }

        while self.layers.last().unwrap().len() > 1 {
            let current = self.layers.last().unwrap();
            let mut next = Vec::with_capacity((current.len() + 1) / 2);

            for pair in current.chunks(2) {
                if pair.len() == 2 {
                    let mut hasher = Hasher::new(self.alg);
                    hasher.update(&pair[0]);
                    hasher.update(&pair[1]);
                    next.push(hasher.finalize());
                } else {
                    // odd node: promoted unchanged
                    next.push(pair[0].clone());
                }
            }
            self.layers.push(next);
        }

        self.sealed = true;
        Ok(())
    }

    /// The root hash; `None` until [`build`](Self::build) has run
    pub fn root(&self) -> Option<&[u8]> {
        if !self.sealed {
            return None;
        }
        self.layers.last().and_then(|layer| layer.first()).map(|h| h.as_slice())
    }

    /// Produce the inclusion proof for the leaf at `index`
    ///
    /// A layer where the node has no sibling (promoted odd node) contributes
    /// no proof element.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        if !self.sealed {
            return Err(Error::Other("merkle tree is not built".to_string()));
        }
        if index >= self.layers[0].len() {
            return Err(Error::Other(format!(
                "leaf index {index} out of range ({} leaves)",
                self.layers[0].len()
            )));
        }

        let mut hashes = Vec::new();
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = idx ^ 1;
            if sibling < layer.len() {
                hashes.push(layer[sibling].clone());
            }
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_count: self.layers[0].len(),
            hashes,
        })
    }
}

/// Inclusion proof for one leaf of a [`MerkleTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Index of the proven leaf
    pub leaf_index: usize,

    /// Total number of leaves in the tree the proof was taken from
    pub leaf_count: usize,

    /// Sibling hashes bottom-up, skipping promoted layers
    pub hashes: Vec<Vec<u8>>,
}

impl MerkleProof {
    /// Verify that `leaf_hash` at this proof's index produces `root`
    pub fn verify(&self, leaf_hash: &[u8], root: &[u8], alg: HashAlgorithm) -> bool {
        if self.leaf_index >= self.leaf_count || self.leaf_count == 0 {
            return false;
        }

        let mut current = leaf_hash.to_vec();
        let mut idx = self.leaf_index;
        let mut width = self.leaf_count;
        let mut steps = self.hashes.iter();

        while width > 1 {
            if idx % 2 == 0 {
                if idx + 1 < width {
                    let Some(sibling) = steps.next() else {
                        return false;
                    };
                    let mut hasher = Hasher::new(alg);
                    hasher.update(&current);
                    hasher.update(sibling);
                    current = hasher.finalize();
                }
                // else: promoted odd node, nothing to combine at this layer
            } else {
                let Some(sibling) = steps.next() else {
                    return false;
                };
                let mut hasher = Hasher::new(alg);
                hasher.update(sibling);
                hasher.update(&current);
                current = hasher.finalize();
            }
            idx /= 2;
            width = width.div_ceil(2);
        }

        steps.next().is_none() && current == root
    }
}

/// Chunk sizing mode for streamed leaf hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSizing {
    /// Every chunk is `size` bytes (the final chunk may be short)
    Fixed(u64),

    /// Explicit per-chunk sizes, consumed in order
    Variable(Vec<u64>),
}

/// Incremental leaf hasher for live capture
///
/// Buffers incoming bytes until a chunk boundary completes, then hashes the
/// chunk as a leaf. Supports an optional separate digest for an fMP4
/// initialization segment fed through [`update_init`](Self::update_init).
pub struct StreamingChunkHasher {
    alg: HashAlgorithm,
    sizing: BlockSizing,
    buffer: Vec<u8>,
    next_block: usize,
    leaves: Vec<Vec<u8>>,
    init_hasher: Option<Hasher>,
}

impl StreamingChunkHasher {
    /// Create a streaming hasher with the given chunk sizing
    pub fn new(alg: HashAlgorithm, sizing: BlockSizing) -> Self {
        Self {
            alg,
            sizing,
            buffer: Vec::new(),
            next_block: 0,
            leaves: Vec::new(),
            init_hasher: None,
        }
    }

    fn current_block_size(&self) -> Option<u64> {
        match &self.sizing {
            BlockSizing::Fixed(size) => Some(*size),
            BlockSizing::Variable(sizes) => sizes.get(self.next_block).copied(),
        }
    }

    /// Feed content bytes; completed chunks are hashed immediately
    pub fn update(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        while let Some(size) = self.current_block_size() {
            let size = size as usize;
            if size == 0 || self.buffer.len() < size {
                break;
            }
            let chunk: Vec<u8> = self.buffer.drain(..size).collect();
            self.leaves.push(hash_bytes(&chunk, self.alg));
            self.next_block += 1;
        }
    }

    /// Feed initialization-segment bytes (hashed separately)
    pub fn update_init(&mut self, data: &[u8]) {
        self.init_hasher
            .get_or_insert_with(|| Hasher::new(self.alg))
            .update(data);
    }

    /// Number of completed leaves so far
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Flush any trailing partial chunk and return (leaves, init digest)
    pub fn finish(mut self) -> Result<(Vec<Vec<u8>>, Option<Vec<u8>>)> {
        if !self.buffer.is_empty() {
            self.leaves.push(hash_bytes(&self.buffer, self.alg));
        }
        let init = self.init_hasher.map(Hasher::finalize);
        Ok((self.leaves, init))
    }

    /// Flush and build the sealed tree over all leaves
    pub fn into_tree(self) -> Result<(MerkleTree, Option<Vec<u8>>)> {
        let alg = self.alg;
        let (leaves, init) = self.finish()?;
        let mut tree = MerkleTree::new(alg);
        for leaf in leaves {
            tree.add_leaf_hash(leaf)?;
        }
        tree.build()?;
        Ok((tree, init))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALG: HashAlgorithm = HashAlgorithm::Sha256;

    fn tree_over(chunks: &[&[u8]]) -> MerkleTree {
        let mut tree = MerkleTree::new(ALG);
        for chunk in chunks {
            tree.add_leaf(chunk).unwrap();
        }
        tree.build().unwrap();
        tree
    }

    #[test]
    fn test_single_leaf_root_equals_leaf() {
        let tree = tree_over(&[b"only"]);
        assert_eq!(tree.root().unwrap(), hash_bytes(b"only", ALG).as_slice());
    }

    #[test]
    fn test_two_leaf_root_is_pair_hash() {
        let tree = tree_over(&[b"left", b"right"]);
        let mut hasher = Hasher::new(ALG);
        hasher.update(&hash_bytes(b"left", ALG));
        hasher.update(&hash_bytes(b"right", ALG));
        assert_eq!(tree.root().unwrap(), hasher.finalize().as_slice());
    }

    #[test]
    fn test_odd_leaf_promoted_unchanged() {
        // With three leaves the third is promoted to layer 1 unchanged
        let tree = tree_over(&[b"a", b"b", b"c"]);

        let ab = {
            let mut hasher = Hasher::new(ALG);
            hasher.update(&hash_bytes(b"a", ALG));
            hasher.update(&hash_bytes(b"b", ALG));
            hasher.finalize()
        };
        let expected_root = {
            let mut hasher = Hasher::new(ALG);
            hasher.update(&ab);
            hasher.update(&hash_bytes(b"c", ALG));
            hasher.finalize()
        };
        assert_eq!(tree.root().unwrap(), expected_root.as_slice());
    }

    #[test]
    fn test_sealed_tree_rejects_mutation() {
        let mut tree = tree_over(&[b"a", b"b"]);
        assert!(matches!(tree.add_leaf(b"c"), Err(Error::TreeSealed)));
        assert!(matches!(tree.build(), Err(Error::TreeSealed)));
    }

    #[test]
    fn test_proofs_verify_for_all_leaves() {
        for leaf_count in 1..=9usize {
            let chunks: Vec<Vec<u8>> = (0..leaf_count)
                .map(|i| format!("chunk-{i}").into_bytes())
                .collect();
            let mut tree = MerkleTree::new(ALG);
            for chunk in &chunks {
                tree.add_leaf(chunk).unwrap();
            }
            tree.build().unwrap();
            let root = tree.root().unwrap().to_vec();

            for (i, chunk) in chunks.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    proof.verify(&hash_bytes(chunk, ALG), &root, ALG),
                    "proof failed for leaf {i} of {leaf_count}"
                );
            }
        }
    }

    #[test]
    fn test_odd_leaf_proof_has_empty_promoted_layer() {
        // Leaf 2 of 3 is promoted through layer 0; its proof has a single
        // element (the hash of the a/b pair at layer 1)
        let tree = tree_over(&[b"a", b"b", b"c"]);
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.hashes.len(), 1);
    }

    #[test]
    fn test_tampered_chunk_fails_proof() {
        let tree = tree_over(&[b"a", b"b", b"c", b"d"]);
        let root = tree.root().unwrap().to_vec();
        let proof = tree.proof(1).unwrap();

        assert!(proof.verify(&hash_bytes(b"b", ALG), &root, ALG));
        assert!(!proof.verify(&hash_bytes(b"B", ALG), &root, ALG));
    }

    #[test]
    fn test_proof_for_wrong_index_fails() {
        let tree = tree_over(&[b"a", b"b", b"c", b"d"]);
        let root = tree.root().unwrap().to_vec();
        let proof = tree.proof(1).unwrap();
        // right hash, wrong position
        assert!(!proof.verify(&hash_bytes(b"a", ALG), &root, ALG));
    }

    #[test]
    fn test_streaming_fixed_blocks_match_direct_tree() {
        let data: Vec<u8> = (0u8..=255).cycle().take(64 * 5 + 13).collect();

        let mut streamer = StreamingChunkHasher::new(ALG, BlockSizing::Fixed(64));
        // feed in uneven pieces to exercise buffering
        for piece in data.chunks(37) {
            streamer.update(piece);
        }
        let (tree, init) = streamer.into_tree().unwrap();
        assert!(init.is_none());
        assert_eq!(tree.leaf_count(), 6); // 5 full + 1 partial

        let mut direct = MerkleTree::new(ALG);
        for chunk in data.chunks(64) {
            direct.add_leaf(chunk).unwrap();
        }
        direct.build().unwrap();

        assert_eq!(tree.root(), direct.root());
    }

    #[test]
    fn test_streaming_variable_blocks() {
        let data = b"aaaabbbbbbcc";
        let sizing = BlockSizing::Variable(vec![4, 6, 2]);

        let mut streamer = StreamingChunkHasher::new(ALG, sizing);
        streamer.update(data);
        let (leaves, _) = streamer.finish().unwrap();

        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0], hash_bytes(b"aaaa", ALG));
        assert_eq!(leaves[1], hash_bytes(b"bbbbbb", ALG));
        assert_eq!(leaves[2], hash_bytes(b"cc", ALG));
    }

    #[test]
    fn test_streaming_init_segment_digest() {
        let mut streamer = StreamingChunkHasher::new(ALG, BlockSizing::Fixed(8));
        streamer.update_init(b"ftyp");
        streamer.update_init(b"moov");
        streamer.update(b"payload!");
        let (leaves, init) = streamer.finish().unwrap();

        assert_eq!(leaves.len(), 1);
        assert_eq!(init.unwrap(), hash_bytes(b"ftypmoov", ALG));
    }
}
