use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine;
use sha2::Digest;

/// A SHA-256 digest.
///
/// Used for packet and acknowledgement commitments as well as for state roots
/// of the mock chains used in tests.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::AsRef,
    derive_more::AsMut,
    derive_more::From,
    derive_more::Into,
    bytemuck::TransparentWrapper,
)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[as_ref(forward)]
#[repr(transparent)]
pub struct CryptoHash(pub [u8; CryptoHash::LENGTH]);

impl CryptoHash {
    /// Length in bytes of the cryptographic hash.
    pub const LENGTH: usize = 32;

    /// Default hash value (all zero bits).
    pub const DEFAULT: CryptoHash = CryptoHash([0; 32]);

    /// Returns a builder which can be used to construct cryptographic hash by
    /// digesting bytes.
    #[inline]
    pub fn builder() -> Builder { Builder::default() }

    /// Returns hash of given bytes.
    #[inline]
    pub fn digest(bytes: &[u8]) -> Self {
        Self::digestv(core::slice::from_ref(&bytes))
    }

    /// Returns hash of concatenation of given byte slices.
    ///
    /// This is equivalent to feeding all the slices into the builder one by
    /// one.
    pub fn digestv(slices: &[&[u8]]) -> Self {
        let mut builder = Self::builder();
        for bytes in slices {
            builder.update(bytes);
        }
        builder.build()
    }

    /// Decodes a base64 string representation of the hash.
    pub fn from_base64(base64: &str) -> Option<Self> {
        // The output buffer must be larger than the decoded data or decoding
        // of a 32-byte value fails.
        let mut buf = [0; 34];
        match BASE64_ENGINE.decode_slice(base64.as_bytes(), &mut buf[..]) {
            Ok(CryptoHash::LENGTH) => {
                let mut hash = Self::DEFAULT;
                hash.0.copy_from_slice(&buf[..CryptoHash::LENGTH]);
                Some(hash)
            }
            _ => None,
        }
    }

    /// Returns a shared reference to the underlying bytes array.
    #[inline]
    pub fn as_array(&self) -> &[u8; Self::LENGTH] { &self.0 }

    /// Returns a shared reference to the hash as slice of bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] { &self.0[..] }

    /// Allocates vector with the contents of the hash.
    #[inline]
    pub fn to_vec(&self) -> alloc::vec::Vec<u8> { self.as_slice().to_vec() }
}

impl core::fmt::Display for CryptoHash {
    /// Encodes the hash as base64 and prints it as a string.
    fn fmt(&self, fmtr: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const ENCODED_LENGTH: usize = (CryptoHash::LENGTH + 2) / 3 * 4;
        let mut buf = [0u8; ENCODED_LENGTH];
        let len = BASE64_ENGINE
            .encode_slice(self.as_slice(), &mut buf[..])
            .map_err(|_| core::fmt::Error)?;
        let encoded =
            core::str::from_utf8(&buf[..len]).map_err(|_| core::fmt::Error)?;
        fmtr.write_str(encoded)
    }
}

impl core::fmt::Debug for CryptoHash {
    #[inline]
    fn fmt(&self, fmtr: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(self, fmtr)
    }
}

impl<'a> TryFrom<&'a [u8]> for CryptoHash {
    type Error = core::array::TryFromSliceError;

    #[inline]
    fn try_from(hash: &'a [u8]) -> Result<Self, Self::Error> {
        <[u8; CryptoHash::LENGTH]>::try_from(hash).map(Self)
    }
}

impl PartialEq<[u8]> for CryptoHash {
    #[inline]
    fn eq(&self, rhs: &[u8]) -> bool { self.as_slice() == rhs }
}

/// Builder for the cryptographic hash.
///
/// The builder calculates the digest of bytes that it’s fed using the
/// [`Builder::update`] method.  Useful when the data is spread over
/// discontiguous buffers.
#[derive(Default)]
pub struct Builder(sha2::Sha256);

impl Builder {
    /// Process data, updating the internal state of the digest.
    #[inline]
    pub fn update(&mut self, bytes: &[u8]) { self.0.update(bytes) }

    /// Finalises the digest and returns the cryptographic hash.
    #[inline]
    pub fn build(self) -> CryptoHash { CryptoHash(self.0.finalize().into()) }
}

#[test]
fn test_new_hash() {
    use hex_literal::hex;

    assert_eq!(CryptoHash::from([0; 32]), CryptoHash::default());

    // https://www.di-mgt.com.au/sha_testvectors.html
    let want = CryptoHash(hex!(
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    ));
    assert_eq!(want, CryptoHash::digest(b""));
    assert_eq!(want, CryptoHash::builder().build());

    let want = CryptoHash(hex!(
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    ));
    assert_eq!(want, CryptoHash::digest(b"abc"));
    assert_eq!(want, CryptoHash::digestv(&[b"a", b"bc"]));
    let got = {
        let mut builder = CryptoHash::builder();
        builder.update(b"ab");
        builder.update(b"c");
        builder.build()
    };
    assert_eq!(want, got);
}

#[test]
fn test_base64() {
    let hash = CryptoHash::digest(b"abc");
    let encoded = alloc::string::ToString::to_string(&hash);
    assert_eq!("ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=", encoded);
    assert_eq!(Some(hash), CryptoHash::from_base64(&encoded));
    assert_eq!(None, CryptoHash::from_base64("abc"));
}
