use alloc::vec::Vec;

use crate::ids::Error;
use crate::Path;

/// Prefix under which a chain stores its IBC state.
///
/// The counterparty’s prefix is recorded in the connection end and prepended
/// to every path verified against that counterparty.
#[derive(Clone, Debug, PartialEq, Eq, derive_more::From, derive_more::Into)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct MerklePrefix(Vec<u8>);

impl MerklePrefix {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            Err(Error::EmptyPrefix)
        } else {
            Ok(Self(prefix))
        }
    }

    pub fn as_bytes(&self) -> &[u8] { self.0.as_slice() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Fully qualified path of a value in the counterparty’s store, a sequence of
/// keys from the outermost store down to the leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
pub struct MerklePath {
    pub key_path: Vec<Vec<u8>>,
}

/// Prepends the prefix to the path.
///
/// Fails if the prefix is empty.  Verifying against an unprefixed path could
/// let a proof for an unrelated store authenticate IBC state.
pub fn apply_prefix(
    prefix: &MerklePrefix,
    path: &Path,
) -> Result<MerklePath, Error> {
    if prefix.is_empty() {
        return Err(Error::EmptyPrefix);
    }
    Ok(MerklePath { key_path: alloc::vec![prefix.0.clone(), path.to_vec()] })
}

#[test]
fn test_apply_prefix() {
    let path = Path::NextConnectionSequence;
    let prefix = MerklePrefix::new(*b"ibc").unwrap();
    let got = apply_prefix(&prefix, &path).unwrap();
    assert_eq!(
        MerklePath {
            key_path: alloc::vec![
                b"ibc".to_vec(),
                b"nextConnectionSequence".to_vec()
            ],
        },
        got
    );

    assert_eq!(Err(Error::EmptyPrefix), MerklePrefix::new(*b""));
    assert_eq!(
        Err(Error::EmptyPrefix),
        apply_prefix(&MerklePrefix::from(Vec::new()), &path)
    );
}
