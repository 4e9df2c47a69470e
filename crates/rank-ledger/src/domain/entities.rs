//! # Domain Entities
//!
//! Rank identifiers, rank sets, usernames and pending purchases.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Separator between the source and destination halves of an upgrade token.
pub const UPGRADE_DELIMITER: &str = "_to_";

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

// =============================================================================
// RankId
// =============================================================================

/// A purchasable rank token.
///
/// Parsed once on construction. Tokens split on the first `_to_`; a token
/// whose source or destination half would be empty stays a plain rank.
/// Serializes back to the exact token it was parsed from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RankId {
    /// A rank owned outright, e.g. `vip`.
    Plain(String),
    /// `source_to_destination`: owning `source` is redeemable for `destination`.
    Upgrade {
        /// Rank given up.
        source: String,
        /// Rank received.
        destination: String,
    },
}

impl RankId {
    /// Parse a raw token.
    pub fn parse(token: impl Into<String>) -> Self {
        let token = token.into();
        match token.split_once(UPGRADE_DELIMITER) {
            Some((source, destination)) if !source.is_empty() && !destination.is_empty() => {
                Self::Upgrade {
                    source: source.to_string(),
                    destination: destination.to_string(),
                }
            }
            _ => Self::Plain(token),
        }
    }

    /// Build an upgrade marker from its halves.
    pub fn upgrade(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::Upgrade {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Is this an upgrade marker?
    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::Upgrade { .. })
    }

    /// Source half of an upgrade marker.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Upgrade { source, .. } => Some(source),
            Self::Plain(_) => None,
        }
    }

    /// Destination half of an upgrade marker.
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Upgrade { destination, .. } => Some(destination),
            Self::Plain(_) => None,
        }
    }

    /// Does this id render to `token`?
    pub fn is_token(&self, token: &str) -> bool {
        match self {
            Self::Plain(name) => name == token,
            Self::Upgrade {
                source,
                destination,
            } => token
                .split_once(UPGRADE_DELIMITER)
                .is_some_and(|(s, d)| s == source && d == destination),
        }
    }
}

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(name) => write!(f, "{}", name),
            Self::Upgrade {
                source,
                destination,
            } => write!(f, "{}{}{}", source, UPGRADE_DELIMITER, destination),
        }
    }
}

impl From<String> for RankId {
    fn from(token: String) -> Self {
        Self::parse(token)
    }
}

impl From<&str> for RankId {
    fn from(token: &str) -> Self {
        Self::parse(token)
    }
}

impl From<RankId> for String {
    fn from(rank: RankId) -> Self {
        rank.to_string()
    }
}

// =============================================================================
// RankSet
// =============================================================================

/// Ordered ranks owned by one username. Insertion order is significant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankSet(Vec<RankId>);

impl RankSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw tokens, preserving order.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(RankId::parse).collect())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no ranks are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, RankId> {
        self.0.iter()
    }

    /// Borrow as a slice.
    pub fn as_slice(&self) -> &[RankId] {
        &self.0
    }

    /// Does the set hold this exact id?
    pub fn contains(&self, rank: &RankId) -> bool {
        self.0.contains(rank)
    }

    /// Does the set hold a rank rendering to `token`?
    pub fn contains_token(&self, token: &str) -> bool {
        self.0.iter().any(|rank| rank.is_token(token))
    }

    /// Any upgrade markers still present?
    pub fn has_upgrade_markers(&self) -> bool {
        self.0.iter().any(RankId::is_upgrade)
    }

    /// Append unless already present. Returns whether it was added.
    pub fn push_unique(&mut self, rank: RankId) -> bool {
        if self.0.contains(&rank) {
            return false;
        }
        self.0.push(rank);
        true
    }

    /// Append unconditionally.
    pub fn push(&mut self, rank: RankId) {
        self.0.push(rank);
    }

    /// Render every id back to its token.
    pub fn tokens(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Unwrap into the inner vector.
    pub fn into_inner(self) -> Vec<RankId> {
        self.0
    }
}

impl From<Vec<RankId>> for RankSet {
    fn from(ranks: Vec<RankId>) -> Self {
        Self(ranks)
    }
}

impl FromIterator<RankId> for RankSet {
    fn from_iter<T: IntoIterator<Item = RankId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RankSet {
    type Item = RankId;
    type IntoIter = std::vec::IntoIter<RankId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankSet {
    type Item = &'a RankId;
    type IntoIter = std::slice::Iter<'a, RankId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Username
// =============================================================================

/// Lowercase and trim a Minecraft username.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A normalized Minecraft username, the storage key for rank sets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Normalize `raw` into a key.
    pub fn normalize(raw: &str) -> Self {
        Self(normalize_username(raw))
    }

    /// The normalized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank after trimming?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Does `raw` normalize to this username?
    pub fn matches(&self, raw: &str) -> bool {
        normalize_username(raw) == self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Username {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<&str> for Username {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

// =============================================================================
// PendingPurchase
// =============================================================================

/// When a checkout started: ISO-8601 text or epoch milliseconds.
///
/// Both encodings occur in stored data and are written back as found.
/// Fractional epoch values are truncated to whole milliseconds on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PurchaseTimestamp {
    /// Epoch milliseconds.
    EpochMillis(Timestamp),
    /// RFC 3339 / ISO-8601 text.
    Iso(String),
}

impl<'de> Deserialize<'de> for PurchaseTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Integer(ms) => Self::EpochMillis(ms),
            Raw::Float(ms) => Self::EpochMillis(ms.trunc() as Timestamp),
            Raw::Text(text) => Self::Iso(text),
        })
    }
}

impl PurchaseTimestamp {
    /// Current wall-clock time as ISO text.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// ISO text for a given instant.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Iso(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Milliseconds since the epoch, or `None` if the text does not parse.
    pub fn as_millis(&self) -> Option<Timestamp> {
        match self {
            Self::EpochMillis(ms) => Some(*ms),
            Self::Iso(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

impl From<Timestamp> for PurchaseTimestamp {
    fn from(ms: Timestamp) -> Self {
        Self::EpochMillis(ms)
    }
}

impl From<String> for PurchaseTimestamp {
    fn from(text: String) -> Self {
        Self::Iso(text)
    }
}

/// A checkout that started but has not been applied yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPurchase {
    /// Payment session id.
    pub session_id: String,
    /// Rank being bought (plain or upgrade).
    pub rank_id: RankId,
    /// Minecraft account receiving the rank, as typed by the buyer.
    pub minecraft_username: String,
    /// Site user who paid.
    pub user_id: String,
    /// Checkout start time.
    pub timestamp: PurchaseTimestamp,
    /// Bought for someone else.
    #[serde(default)]
    pub is_gift: bool,
    /// Gift recipient display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl PendingPurchase {
    /// Non-gift purchase started now.
    pub fn new(
        session_id: impl Into<String>,
        rank_id: impl Into<RankId>,
        minecraft_username: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            rank_id: rank_id.into(),
            minecraft_username: minecraft_username.into(),
            user_id: user_id.into(),
            timestamp: PurchaseTimestamp::now(),
            is_gift: false,
            recipient: None,
        }
    }

    /// Override the start time.
    pub fn at(mut self, timestamp: impl Into<PurchaseTimestamp>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Mark as a gift.
    pub fn gifted_to(mut self, recipient: impl Into<String>) -> Self {
        self.is_gift = true;
        self.recipient = Some(recipient.into());
        self
    }

    /// Normalized form of the receiving username.
    pub fn username(&self) -> Username {
        Username::normalize(&self.minecraft_username)
    }

    /// Same rank and (normalized) username?
    pub fn is_for(&self, rank_id: &str, username: &Username) -> bool {
        self.rank_id.is_token(rank_id) && username.matches(&self.minecraft_username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_rank() {
        let rank = RankId::parse("shadow_enchanter");
        assert_eq!(rank, RankId::Plain("shadow_enchanter".to_string()));
        assert!(!rank.is_upgrade());
    }

    #[test]
    fn test_parse_upgrade_marker() {
        let rank = RankId::parse("vip_to_mvp");
        assert_eq!(rank.source(), Some("vip"));
        assert_eq!(rank.destination(), Some("mvp"));
        assert_eq!(rank.to_string(), "vip_to_mvp");
    }

    #[test]
    fn test_parse_splits_on_first_delimiter() {
        let rank = RankId::parse("a_to_b_to_c");
        assert_eq!(rank.source(), Some("a"));
        assert_eq!(rank.destination(), Some("b_to_c"));
        assert_eq!(rank.to_string(), "a_to_b_to_c");
    }

    #[test]
    fn test_malformed_markers_are_plain() {
        for token in ["_to_mvp", "vip_to_", "_to_"] {
            let rank = RankId::parse(token);
            assert_eq!(rank, RankId::Plain(token.to_string()), "{token}");
        }
    }

    #[test]
    fn test_rank_id_serializes_as_token() {
        let json = serde_json::to_string(&RankId::upgrade("vip", "mvp")).unwrap();
        assert_eq!(json, "\"vip_to_mvp\"");
        let back: RankId = serde_json::from_str(&json).unwrap();
        assert!(back.is_upgrade());
    }

    #[test]
    fn test_rank_set_push_unique() {
        let mut set = RankSet::from_tokens(["vip"]);
        assert!(!set.push_unique(RankId::parse("vip")));
        assert!(set.push_unique(RankId::parse("mvp")));
        assert_eq!(set.tokens(), vec!["vip", "mvp"]);
    }

    #[test]
    fn test_rank_set_contains_token() {
        let set = RankSet::from_tokens(["vip", "vip_to_mvp"]);
        assert!(set.contains_token("vip_to_mvp"));
        assert!(!set.contains_token("mvp"));
        assert!(set.has_upgrade_markers());
    }

    #[test]
    fn test_username_normalization() {
        assert_eq!(Username::normalize("  Steve ").as_str(), "steve");
        assert_eq!(Username::from("STEVE"), Username::from("steve"));
        assert!(Username::normalize("   ").is_empty());
    }

    #[test]
    fn test_username_deserializes_normalized() {
        let name: Username = serde_json::from_str("\" Alex\"").unwrap();
        assert_eq!(name.as_str(), "alex");
    }

    #[test]
    fn test_timestamp_accepts_both_encodings() {
        let iso: PurchaseTimestamp = serde_json::from_str("\"2024-03-01T12:00:00.000Z\"").unwrap();
        let ms: PurchaseTimestamp = serde_json::from_str("1709294400000").unwrap();
        assert_eq!(iso.as_millis(), Some(1_709_294_400_000));
        assert_eq!(ms.as_millis(), Some(1_709_294_400_000));
    }

    #[test]
    fn test_float_epoch_truncated() {
        let ts: PurchaseTimestamp = serde_json::from_str("1709294400000.75").unwrap();
        assert_eq!(ts, PurchaseTimestamp::EpochMillis(1_709_294_400_000));

        let purchase: PendingPurchase = serde_json::from_str(
            r#"{"sessionId":"cs_1","rankId":"vip","minecraftUsername":"Steve","userId":"u1","timestamp":1709294400000.0}"#,
        )
        .unwrap();
        assert_eq!(purchase.timestamp.as_millis(), Some(1_709_294_400_000));
        assert_eq!(serde_json::to_value(&purchase).unwrap()["timestamp"], 1_709_294_400_000i64);
    }

    #[test]
    fn test_unparseable_timestamp() {
        let ts = PurchaseTimestamp::Iso("yesterday".to_string());
        assert_eq!(ts.as_millis(), None);
    }

    #[test]
    fn test_pending_purchase_json_shape() {
        let purchase = PendingPurchase::new("cs_1", "vip", "Steve", "user-1")
            .at(1_000)
            .gifted_to("Alex");
        let value = serde_json::to_value(&purchase).unwrap();
        assert_eq!(value["sessionId"], "cs_1");
        assert_eq!(value["rankId"], "vip");
        assert_eq!(value["minecraftUsername"], "Steve");
        assert_eq!(value["timestamp"], 1_000);
        assert_eq!(value["isGift"], true);
        assert_eq!(value["recipient"], "Alex");
    }

    #[test]
    fn test_pending_purchase_without_optional_fields() {
        let json = r#"{"sessionId":"cs_2","rankId":"vip_to_mvp","minecraftUsername":"steve",
                       "userId":"u","timestamp":"2024-01-01T00:00:00Z"}"#;
        let purchase: PendingPurchase = serde_json::from_str(json).unwrap();
        assert!(!purchase.is_gift);
        assert!(purchase.recipient.is_none());
        assert!(purchase.rank_id.is_upgrade());
    }

    #[test]
    fn test_pending_purchase_is_for() {
        let purchase = PendingPurchase::new("cs_1", "vip", " Steve ", "user-1");
        assert!(purchase.is_for("vip", &Username::normalize("STEVE")));
        assert!(!purchase.is_for("mvp", &Username::normalize("steve")));
    }
}
