//! Connection version negotiation.
//!
//! A version is an identifier together with a set of features.  Chains
//! advertise ordered lists of versions they support and, during the
//! connection handshake, the chain executing `ConnOpenTry` picks the first of
//! its supported versions which the counterparty also offers.

/// Identifier of the default version.
pub const DEFAULT_IDENTIFIER: &str = "1";

/// Feature signalling support for ordered channels.
pub const ORDER_ORDERED: &str = "ORDER_ORDERED";

/// Feature signalling support for unordered channels.
pub const ORDER_UNORDERED: &str = "ORDER_UNORDERED";

/// Maximum number of features a single version may declare.
pub const MAX_FEATURES: usize = 100;

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
)]
pub struct Version {
    pub identifier: String,
    pub features: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum VersionError {
    #[display(fmt = "version identifier is blank")]
    BlankIdentifier,
    #[display(fmt = "version declares {} features (max {})", _0, MAX_FEATURES)]
    TooManyFeatures(usize),
    #[display(fmt = "version {} declares a blank feature", _0)]
    BlankFeature(String),
    #[display(fmt = "no versions given")]
    NoVersions,
    #[display(fmt = "version {} is not supported", _0)]
    UnsupportedIdentifier(String),
    #[display(
        fmt = "version {} does not support feature {}",
        identifier,
        feature
    )]
    UnsupportedFeature { identifier: String, feature: String },
    #[display(fmt = "version {} does not allow an empty feature set", _0)]
    EmptyFeatureSet(String),
    #[display(fmt = "connection has {} versions, expected exactly one", _0)]
    NotSingleVersion(usize),
    #[display(fmt = "no compatible version could be negotiated")]
    NegotiationFailed,
}

type Result<T = (), E = VersionError> = core::result::Result<T, E>;

/// Returns whether given version identifier allows an empty feature set.
pub fn allow_empty_feature_set(identifier: &str) -> bool {
    identifier != DEFAULT_IDENTIFIER
}

impl Version {
    pub fn new(identifier: impl Into<String>, features: Vec<String>) -> Self {
        Self { identifier: identifier.into(), features }
    }

    /// Returns the default version supporting both channel orderings.
    pub fn default_version() -> Self {
        Self::new(
            DEFAULT_IDENTIFIER,
            vec![ORDER_ORDERED.into(), ORDER_UNORDERED.into()],
        )
    }

    /// Checks that the identifier and all features are non-blank and the
    /// number of features is within limits.
    pub fn validate(&self) -> Result {
        if self.identifier.trim().is_empty() {
            return Err(VersionError::BlankIdentifier);
        }
        if self.features.len() > MAX_FEATURES {
            return Err(VersionError::TooManyFeatures(self.features.len()));
        }
        if self.features.iter().any(|feature| feature.trim().is_empty()) {
            return Err(VersionError::BlankFeature(self.identifier.clone()));
        }
        Ok(())
    }

    /// Returns whether the version declares given feature.
    pub fn verify_supported_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|have| have == feature)
    }

    /// Verifies that `proposed` can be accepted by a chain which supports
    /// `self`.
    ///
    /// The identifiers must match and every proposed feature must be
    /// supported.  Proposing an empty feature set is rejected if the
    /// identifier doesn’t allow it.
    pub fn verify_proposed_version(&self, proposed: &Version) -> Result {
        if self.identifier != proposed.identifier {
            return Err(VersionError::UnsupportedIdentifier(
                proposed.identifier.clone(),
            ));
        }
        if proposed.features.is_empty() &&
            !allow_empty_feature_set(&proposed.identifier)
        {
            return Err(VersionError::EmptyFeatureSet(
                proposed.identifier.clone(),
            ));
        }
        match proposed
            .features
            .iter()
            .find(|feature| !self.verify_supported_feature(feature))
        {
            Some(feature) => Err(VersionError::UnsupportedFeature {
                identifier: proposed.identifier.clone(),
                feature: feature.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Returns the version from `versions` with the same identifier as `version`.
pub fn find_supported_version<'a>(
    version: &Version,
    versions: &'a [Version],
) -> Option<&'a Version> {
    versions.iter().find(|have| have.identifier == version.identifier)
}

/// Checks that `proposed` is acceptable given list of `supported` versions.
pub fn verify_supported_version(
    supported: &[Version],
    proposed: &Version,
) -> Result {
    find_supported_version(proposed, supported)
        .ok_or_else(|| {
            VersionError::UnsupportedIdentifier(proposed.identifier.clone())
        })?
        .verify_proposed_version(proposed)
}

pub fn is_supported_version(supported: &[Version], proposed: &Version) -> bool {
    verify_supported_version(supported, proposed).is_ok()
}

/// Returns features of `source` which are also present in `counterparty`,
/// preserving order of `source`.
pub fn feature_set_intersection(
    source: &[String],
    counterparty: &[String],
) -> Vec<String> {
    source
        .iter()
        .filter(|feature| counterparty.contains(feature))
        .cloned()
        .collect()
}

/// Picks version to use for a connection.
///
/// Iterates over `supported` in order and returns the first version whose
/// identifier is also offered by the counterparty, with features set to the
/// intersection of both sides’ features.  Versions whose intersection is
/// empty are skipped if their identifier doesn’t allow empty feature sets.
pub fn pick_version(
    supported: &[Version],
    counterparty: &[Version],
) -> Result<Version> {
    supported
        .iter()
        .find_map(|ours| {
            let theirs = find_supported_version(ours, counterparty)?;
            let features =
                feature_set_intersection(&ours.features, &theirs.features);
            if features.is_empty() && !allow_empty_feature_set(&ours.identifier)
            {
                None
            } else {
                Some(Version::new(ours.identifier.clone(), features))
            }
        })
        .ok_or(VersionError::NegotiationFailed)
}

/// Validates list of versions offered by a chain.
pub fn validate_versions(versions: &[Version]) -> Result {
    if versions.is_empty() {
        return Err(VersionError::NoVersions);
    }
    versions.iter().try_for_each(Version::validate)
}

/// Returns the single version of a connection.
///
/// Channels may only be opened on connections which have finished
/// negotiating a version.
pub fn single_version(versions: &[Version]) -> Result<&Version> {
    match versions {
        [version] => Ok(version),
        _ => Err(VersionError::NotSingleVersion(versions.len())),
    }
}
