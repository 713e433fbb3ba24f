use serde::{Deserialize, Serialize};

use crate::config::UNASSIGNED_WAR_TAG;
use crate::error::AppError;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Normalised game tag (`#` followed by the uppercase tag body).
///
/// The API spells the tag inconsistently: the `#` may arrive raw or already
/// URL-encoded as `%23`, and some responses render the letter `O` where the
/// digit `0` belongs. The tag alphabet has no `O`, so every `O` is folded to
/// `0`. Two tags are equal only in this normalised form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

pub type ClanTag = Tag;

impl Tag {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let body = if let Some(rest) = trimmed.strip_prefix('#') {
            rest
        } else if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("%23")) {
            &trimmed[3..]
        } else {
            trimmed
        };

        if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidTag(raw.to_string()));
        }

        let body: String = body
            .chars()
            .map(|c| match c.to_ascii_uppercase() {
                'O' => '0',
                other => other,
            })
            .collect();
        Ok(Self(format!("#{body}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path-segment form: `#` escaped as `%23`.
    pub fn url_encoded(&self) -> String {
        format!("%23{}", &self.0[1..])
    }

    /// True for the placeholder war tag of a pairing that is not drawn yet.
    pub fn is_unassigned(&self) -> bool {
        self.0 == UNASSIGNED_WAR_TAG
    }
}

impl TryFrom<String> for Tag {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tag::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Tag {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Member,
    /// Shown in game as "Elder".
    Admin,
    CoLeader,
    Leader,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::CoLeader => "coLeader",
            Role::Leader => "leader",
            Role::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub tag: Tag,
    pub role: Role,
}

/// `GET /clans/{tag}/members`
#[derive(Debug, Clone, Deserialize)]
pub struct MemberList {
    #[serde(default)]
    pub items: Vec<Member>,
}

// ---------------------------------------------------------------------------
// War phases
// ---------------------------------------------------------------------------

/// `state` field shared by league groups and (league) wars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarPhase {
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
    /// League group only.
    Ended,
    #[serde(other)]
    Unknown,
}

impl WarPhase {
    /// Phases during which a tournament poll keeps ticking.
    pub fn is_active(&self) -> bool {
        matches!(self, WarPhase::Preparation | WarPhase::InWar)
    }
}

impl std::fmt::Display for WarPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WarPhase::NotInWar => "notInWar",
            WarPhase::Preparation => "preparation",
            WarPhase::InWar => "inWar",
            WarPhase::WarEnded => "warEnded",
            WarPhase::Ended => "ended",
            WarPhase::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// War league
// ---------------------------------------------------------------------------

/// `GET /clans/{tag}/currentwar/leaguegroup`
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueGroup {
    pub state: WarPhase,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub clans: Vec<LeagueClan>,
    #[serde(default)]
    pub rounds: Vec<WarRound>,
}

impl LeagueGroup {
    pub fn is_ended(&self) -> bool {
        self.state == WarPhase::Ended
    }

    /// Clan entry matching `clan_tag` after normalisation.
    pub fn find_clan(&self, clan_tag: &ClanTag) -> Option<&LeagueClan> {
        self.clans.iter().find(|c| &c.tag == clan_tag)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueClan {
    pub tag: ClanTag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<LeagueMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueMember {
    pub name: String,
    pub tag: Tag,
    #[serde(default)]
    pub town_hall_level: u32,
}

/// One round of a tournament: a war tag per pairing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarRound {
    #[serde(default)]
    pub war_tags: Vec<Tag>,
}

impl WarRound {
    pub fn is_assigned(&self) -> bool {
        !self.war_tags.is_empty() && !self.war_tags.iter().any(Tag::is_unassigned)
    }
}

// ---------------------------------------------------------------------------
// Wars (regular and league skirmishes share the shape)
// ---------------------------------------------------------------------------

/// `GET /clans/{tag}/currentwar` and `GET /clanwarleagues/wars/{warTag}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    pub state: WarPhase,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub clan: Option<WarClan>,
    #[serde(default)]
    pub opponent: Option<WarClan>,
}

impl War {
    /// The side played by `clan_tag`, if any.
    pub fn side_of(&self, clan_tag: &ClanTag) -> Option<&WarClan> {
        [self.clan.as_ref(), self.opponent.as_ref()]
            .into_iter()
            .flatten()
            .find(|side| &side.tag == clan_tag)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarClan {
    pub tag: ClanTag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<WarMember>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMember {
    pub tag: Tag,
    pub name: String,
    #[serde(default)]
    pub map_position: u32,
    #[serde(default)]
    pub attacks: Vec<Attack>,
}

impl WarMember {
    /// Stars of the first attack; no attack counts as zero.
    pub fn first_attack_stars(&self) -> u32 {
        self.attacks.first().map(|a| a.stars).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attack {
    #[serde(default)]
    pub stars: u32,
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// `GET /players/{tag}`
#[derive(Debug, Clone, Deserialize)]
pub struct Player {
    pub tag: Tag,
    pub name: String,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Achievement {
    pub name: String,
    #[serde(default)]
    pub value: i64,
}

// ---------------------------------------------------------------------------
// Stored snapshots
// ---------------------------------------------------------------------------

/// Raid coins of one member. `saved = collected - donated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidStatistic {
    pub member_name: String,
    pub member_tag: Tag,
    pub collected: i64,
    pub donated: i64,
    pub saved: i64,
}

impl RaidStatistic {
    pub fn new(member_name: String, member_tag: Tag, collected: i64, donated: i64) -> Self {
        Self {
            member_name,
            member_tag,
            collected,
            donated,
            saved: collected - donated,
        }
    }
}

/// One observation fed into the war-league accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarObservation {
    pub member_name: String,
    pub member_tag: Tag,
    pub stars: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalises_glyph_and_prefix() {
        let a = Tag::parse("#2PP0OYL").unwrap();
        let b = Tag::parse("%232pp00yl").unwrap();
        let c = Tag::parse(" 2PPOOYL ").unwrap();
        assert_eq!(a.as_str(), "#2PP00YL");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!("%23abc".parse::<Tag>().unwrap().as_str(), "#ABC");
    }

    #[test]
    fn tag_url_encodes_hash() {
        let tag = Tag::parse("#ABC").unwrap();
        assert_eq!(tag.url_encoded(), "%23ABC");
    }

    #[test]
    fn tag_rejects_garbage() {
        assert!(Tag::parse("").is_err());
        assert!(Tag::parse("#").is_err());
        assert!(Tag::parse("#AB/C").is_err());
    }

    #[test]
    fn unassigned_round_detected() {
        let round: WarRound =
            serde_json::from_value(serde_json::json!({ "warTags": ["#0", "#0", "#0", "#0"] }))
                .unwrap();
        assert!(!round.is_assigned());

        let round: WarRound =
            serde_json::from_value(serde_json::json!({ "warTags": ["#8QY", "#9LP"] })).unwrap();
        assert!(round.is_assigned());
    }

    #[test]
    fn war_side_matches_normalised_tag() {
        let war: War = serde_json::from_value(serde_json::json!({
            "state": "inWar",
            "clan": { "tag": "#AAA", "members": [] },
            "opponent": { "tag": "#B0B", "members": [] }
        }))
        .unwrap();
        let side = war.side_of(&Tag::parse("#BOB").unwrap()).unwrap();
        assert_eq!(side.tag.as_str(), "#B0B");
    }

    #[test]
    fn missing_attack_counts_zero_stars() {
        let member: WarMember = serde_json::from_value(serde_json::json!({
            "tag": "#P1", "name": "a", "mapPosition": 3
        }))
        .unwrap();
        assert_eq!(member.first_attack_stars(), 0);
    }

    #[test]
    fn unknown_role_and_phase_deserialise() {
        let m: Member = serde_json::from_value(serde_json::json!({
            "name": "x", "tag": "#P2", "role": "warChief"
        }))
        .unwrap();
        assert_eq!(m.role, Role::Unknown);
        let phase: WarPhase = serde_json::from_value(serde_json::json!("groupNotFound")).unwrap();
        assert_eq!(phase, WarPhase::Unknown);
    }
}
