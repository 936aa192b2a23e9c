//! Validated newtypes: each wraps a primitive and enforces its invariant at
//! construction so an instance in hand is proof the invariant holds — no type here
//! can be built with invalid data.

use crate::validation::column_name;
use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source or table display name after whitespace trimming.
///
/// # Invariants
/// - Non-empty after trimming.
/// - At most 256 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedName(String);

impl ValidatedName {
    pub const MAX_LENGTH: usize = 256;

    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let trimmed = raw.into().trim().to_string();
        ensure!(!trimmed.is_empty(), "name must not be empty");
        ensure!(
            trimmed.len() <= Self::MAX_LENGTH,
            "name exceeds {} characters",
            Self::MAX_LENGTH
        );
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A derived-column name obeying §4.E step 1 (non-empty, no spaces/dots, no
/// leading digit, identifier characters only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedColumnName(String);

impl ValidatedColumnName {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        column_name::validate(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A source ID of the form `src-<12 hex chars>`, derived from a content hash of
/// the source's display name (spec §4.G).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    const PREFIX: &'static str = "src-";
    const HEX_LEN: usize = 12;

    /// Derive the stable ID for a source name: `src-` followed by the first 12
    /// hex characters of the xxh3 hash of the lowercased name. Deterministic so
    /// re-adding the same name resolves to the same ID ("reconnect").
    pub fn from_name(name: &str) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_64(name.to_lowercase().as_bytes());
        let hex = hex::encode(hash.to_be_bytes());
        Self(format!("{}{}", Self::PREFIX, &hex[..Self::HEX_LEN]))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        ensure!(
            raw.starts_with(Self::PREFIX) && raw.len() == Self::PREFIX.len() + Self::HEX_LEN,
            "invalid source id: {}",
            raw
        );
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque handle minted by a bounded FIFO store (spec §4.J). `Prefix` is a
/// marker type distinguishing result-cache IDs (`qr-`) from spec-store IDs (`spec-`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpaqueId<Prefix> {
    value: String,
    #[serde(skip)]
    _marker: std::marker::PhantomData<Prefix>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultPrefix;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecPrefix;

pub type ResultId = OpaqueId<ResultPrefix>;
pub type SpecId = OpaqueId<SpecPrefix>;

pub trait IdPrefix {
    const PREFIX: &'static str;
}

impl IdPrefix for ResultPrefix {
    const PREFIX: &'static str = "qr-";
}

impl IdPrefix for SpecPrefix {
    const PREFIX: &'static str = "spec-";
}

impl<P: IdPrefix> OpaqueId<P> {
    /// Mint a fresh ID: prefix plus 8 random hex characters.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect();
        Self {
            value: format!("{}{}", P::PREFIX, suffix),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        ensure!(raw.starts_with(P::PREFIX), "id missing prefix {}: {}", P::PREFIX, raw);
        Ok(Self {
            value: raw.to_string(),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<P> fmt::Display for OpaqueId<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Semantic type of a data column (spec §3 `DataColumn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Date,
    Id,
    Text,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Date => "date",
            SemanticType::Id => "id",
            SemanticType::Text => "text",
        };
        write!(f, "{s}")
    }
}

/// Which layer a transform record belongs to (spec §3 `TransformRecord`, §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Working,
    Derived,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layer::Working => "working",
            Layer::Derived => "derived",
        };
        write!(f, "{s}")
    }
}

/// The two supported connector kinds (spec §3 `Source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Csv,
    Sqlite,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Csv => "csv",
            SourceType::Sqlite => "sqlite",
        };
        write!(f, "{s}")
    }
}

/// Parse an error out of the distance-from-one-source-type enum, used where a
/// config string (`"csv"`/`"sqlite"`) arrives over the wire.
impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(SourceType::Csv),
            "sqlite" | "db" => Ok(SourceType::Sqlite),
            other => Err(anyhow!("unknown source type: {other}")),
        }
    }
}
