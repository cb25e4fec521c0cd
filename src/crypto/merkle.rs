//! Merkle root computation over transaction ids
//!
//! Transaction ids are hex strings; each parent is the SHA-256 hex of the
//! concatenation of its two children's hex strings.

use serde::{Deserialize, Serialize};

use super::hash::sha256_hex;

/// How a layer with an odd number of elements is reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MerkleMode {
    /// The NoobChain pairing: `(0,1), (2,3), …`; a trailing unpaired element
    /// is dropped, so with an odd count the last transaction is not committed.
    Legacy,
    /// A trailing unpaired element is paired with itself, so every
    /// transaction contributes to the root.
    #[default]
    Balanced,
}

/// Calculate the merkle root of an ordered list of transaction ids.
///
/// Returns `None` for an empty list; a block must carry at least one
/// transaction before it can be sealed. A single id is its own root.
pub fn calculate_merkle_root<S: AsRef<str>>(ids: &[S], mode: MerkleMode) -> Option<String> {
    if ids.is_empty() {
        return None;
    }

    let mut layer: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len() / 2 + 1);

        for pair in layer.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [last] => {
                    if mode == MerkleMode::Balanced {
                        next.push(hash_pair(last, last));
                    }
                }
                _ => unreachable!("chunks(2) yields one or two elements"),
            }
        }

        layer = next;
    }

    layer.pop()
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut data = String::with_capacity(left.len() + right.len());
    data.push_str(left);
    data.push_str(right);
    sha256_hex(data.as_bytes())
}
