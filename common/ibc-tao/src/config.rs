use core::time::Duration;

use ibc_ids::MerklePrefix;

use crate::connection::version::{self, Version, VersionError};

/// IBC core parameters.
///
/// Those are not part of the provable state.  Changing them affects only how
/// future messages are handled.
#[derive(
    Clone, Debug, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize,
)]
pub struct Config {
    /// Expected upper bound of time between two blocks, in nanoseconds.
    ///
    /// Used to convert connection delay period into number of blocks which
    /// must pass before a packet proof is accepted.  Zero disables the
    /// block delay.
    pub max_expected_time_per_block_ns: u64,

    /// Time, in nanoseconds, the counterparty has to finish an upgrade once
    /// this chain starts flushing.
    pub upgrade_timeout_ns: u64,

    /// Signer allowed to initialise upgrades and to cancel them without
    /// proof.  If empty, nobody is.
    pub authority: String,

    /// Prefix of this chain’s IBC store as recorded by counterparties.
    pub commitment_prefix: MerklePrefix,

    /// Connection versions this chain supports, in order of preference.
    pub compatible_versions: Vec<Version>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_expected_time_per_block_ns: 30_000_000_000,
            upgrade_timeout_ns: 600_000_000_000,
            authority: String::new(),
            commitment_prefix: MerklePrefix::from(b"ibc".to_vec()),
            compatible_versions: vec![Version::default_version()],
        }
    }
}

impl Config {
    pub fn with_authority(authority: impl Into<String>) -> Self {
        Self { authority: authority.into(), ..Self::default() }
    }

    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_nanos(self.upgrade_timeout_ns)
    }

    pub fn is_authority(&self, signer: &str) -> bool {
        !self.authority.is_empty() && self.authority == signer
    }

    /// Returns number of blocks corresponding to given delay period.
    ///
    /// This is `delay / max_expected_time_per_block` rounded up or zero if
    /// the expected time per block is not configured.
    pub fn block_delay(&self, delay: Duration) -> u64 {
        let per_block = u128::from(self.max_expected_time_per_block_ns);
        if per_block == 0 {
            return 0;
        }
        let blocks = (delay.as_nanos() + per_block - 1) / per_block;
        u64::try_from(blocks).unwrap_or(u64::MAX)
    }

    /// Applies updates to the configuration.
    ///
    /// All updates are validated before any is applied so on error the
    /// configuration is left unchanged.
    pub fn update(
        &mut self,
        config: UpdateConfig,
    ) -> Result<(), UpdateConfigError> {
        if let Some(prefix) = config.commitment_prefix.as_ref() {
            if prefix.is_empty() {
                return Err(UpdateConfigError::EmptyCommitmentPrefix);
            }
        }
        if let Some(versions) = config.compatible_versions.as_ref() {
            version::validate_versions(versions)?;
        }

        if let Some(ns) = config.max_expected_time_per_block_ns {
            self.max_expected_time_per_block_ns = ns;
        }
        if let Some(ns) = config.upgrade_timeout_ns {
            self.upgrade_timeout_ns = ns;
        }
        if let Some(authority) = config.authority {
            self.authority = authority;
        }
        if let Some(prefix) = config.commitment_prefix {
            self.commitment_prefix = prefix;
        }
        if let Some(versions) = config.compatible_versions {
            self.compatible_versions = versions;
        }
        Ok(())
    }
}

#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    borsh::BorshSerialize,
    borsh::BorshDeserialize,
)]
pub struct UpdateConfig {
    pub max_expected_time_per_block_ns: Option<u64>,
    pub upgrade_timeout_ns: Option<u64>,
    pub authority: Option<String>,
    pub commitment_prefix: Option<MerklePrefix>,
    pub compatible_versions: Option<Vec<Version>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateConfigError {
    /// Commitment prefix must not be empty.
    EmptyCommitmentPrefix,
    /// Compatible versions list is empty or contains an invalid version.
    InvalidVersions(VersionError),
}

impl From<VersionError> for UpdateConfigError {
    fn from(err: VersionError) -> Self { Self::InvalidVersions(err) }
}

#[test]
fn test_block_delay() {
    let config = Config::default();
    assert_eq!(0, config.block_delay(Duration::ZERO));
    assert_eq!(1, config.block_delay(Duration::from_secs(1)));
    assert_eq!(1, config.block_delay(Duration::from_secs(30)));
    assert_eq!(2, config.block_delay(Duration::from_secs(31)));
    assert_eq!(120, config.block_delay(Duration::from_secs(3600)));

    let config = Config { max_expected_time_per_block_ns: 0, ..config };
    assert_eq!(0, config.block_delay(Duration::from_secs(3600)));
}

#[test]
fn test_update() {
    let mut config = Config::with_authority("gov");
    assert!(config.is_authority("gov"));
    assert!(!config.is_authority("relayer"));
    assert!(!Config::default().is_authority(""));

    let bad = UpdateConfig {
        upgrade_timeout_ns: Some(1),
        commitment_prefix: Some(MerklePrefix::from(Vec::new())),
        ..Default::default()
    };
    assert_eq!(
        Err(UpdateConfigError::EmptyCommitmentPrefix),
        config.update(bad)
    );
    assert_eq!(600_000_000_000, config.upgrade_timeout_ns);

    let bad = UpdateConfig {
        compatible_versions: Some(Vec::new()),
        ..Default::default()
    };
    assert_eq!(
        Err(UpdateConfigError::InvalidVersions(VersionError::NoVersions)),
        config.update(bad)
    );

    let good = UpdateConfig {
        upgrade_timeout_ns: Some(1),
        authority: Some("admin".into()),
        ..Default::default()
    };
    assert_eq!(Ok(()), config.update(good));
    assert_eq!(Duration::from_nanos(1), config.upgrade_timeout());
    assert!(config.is_authority("admin"));
}
