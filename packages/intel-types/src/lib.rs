//! # intel-types
//!
//! Shared data model for the Fieldlapse timelapse pipeline.
//!
//! These types are used by:
//! - `backend`: normalizing raw comm-feed records and persisting them
//! - `world-sim`: replaying normalized actions into portal/link/field state
//! - the external renderer: consuming `WorldSnapshot` frames over the pipe
//!
//! ## Wire Conventions
//!
//! - Coordinates are signed decimal degrees; the feed delivers E6 integers
//!   (degrees × 10⁶) which the normalizer divides down.
//! - Timestamps are epoch milliseconds (`i64`) everywhere.
//! - Action verbs and kinds serialize to the exact closed string sets the
//!   history store persists (`captured_RES`, `destroy`, `reso`, …), so a
//!   record read back from the store re-normalizes to itself.

use serde::{Deserialize, Serialize};

// ── Faction ───────────────────────────────────────────────────────────────────

/// Owning team of a portal, link, or field.
///
/// `MACHINA` appears in feed markup and is carried through records and
/// snapshots for the renderer, but the simulator never assigns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Faction {
    Res,
    Enl,
    #[default]
    Neutral,
    Machina,
}

impl Faction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Faction::Res => "RES",
            Faction::Enl => "ENL",
            Faction::Neutral => "NEUTRAL",
            Faction::Machina => "MACHINA",
        }
    }

    /// Parse a stored faction string. Unknown values fall back to `NEUTRAL`.
    pub fn parse(s: &str) -> Self {
        match s {
            "RES" => Faction::Res,
            "ENL" => Faction::Enl,
            "MACHINA" => Faction::Machina,
            _ => Faction::Neutral,
        }
    }

    /// Map a markup `team` attribute (`RESISTANCE`, `ENLIGHTENED`, `MACHINA`)
    /// to its short form.
    pub fn from_team(team: &str) -> Self {
        match team {
            "RESISTANCE" | "RES" => Faction::Res,
            "ENLIGHTENED" | "ENL" => Faction::Enl,
            "MACHINA" => Faction::Machina,
            _ => Faction::Neutral,
        }
    }
}

impl std::fmt::Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Action Kind ───────────────────────────────────────────────────────────────

/// What game object a feed event refers to. `destroy` verbs are disambiguated
/// by this kind (a destroyed resonator and a destroyed link both arrive as
/// `action = destroy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Portal,
    Link,
    Field,
    Reso,
    Mod,
    #[serde(rename = "battlebeacon")]
    BattleBeacon,
    #[default]
    Unknown,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Portal => "portal",
            ActionKind::Link => "link",
            ActionKind::Field => "field",
            ActionKind::Reso => "reso",
            ActionKind::Mod => "mod",
            ActionKind::BattleBeacon => "battlebeacon",
            ActionKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "portal" => ActionKind::Portal,
            "link" => ActionKind::Link,
            "field" => ActionKind::Field,
            "reso" => ActionKind::Reso,
            "mod" => ActionKind::Mod,
            "battlebeacon" => ActionKind::BattleBeacon,
            _ => ActionKind::Unknown,
        }
    }
}

// ── Action Verb ───────────────────────────────────────────────────────────────

/// Normalized action verb — the closed post-normalization set.
///
/// Faction-colored verbs carry their suffix (`link_RES`); `destroy` is bare
/// and relies on [`ActionKind`] for its subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionVerb {
    #[serde(rename = "captured_RES")]
    CapturedRes,
    #[serde(rename = "captured_ENL")]
    CapturedEnl,
    #[serde(rename = "deploy_RES")]
    DeployRes,
    #[serde(rename = "deploy_ENL")]
    DeployEnl,
    #[serde(rename = "link_RES")]
    LinkRes,
    #[serde(rename = "link_ENL")]
    LinkEnl,
    #[serde(rename = "field_RES")]
    FieldRes,
    #[serde(rename = "field_ENL")]
    FieldEnl,
    #[serde(rename = "destroy")]
    Destroy,
    #[serde(rename = "won_RES")]
    WonRes,
    #[serde(rename = "won_ENL")]
    WonEnl,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ActionVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::CapturedRes => "captured_RES",
            ActionVerb::CapturedEnl => "captured_ENL",
            ActionVerb::DeployRes => "deploy_RES",
            ActionVerb::DeployEnl => "deploy_ENL",
            ActionVerb::LinkRes => "link_RES",
            ActionVerb::LinkEnl => "link_ENL",
            ActionVerb::FieldRes => "field_RES",
            ActionVerb::FieldEnl => "field_ENL",
            ActionVerb::Destroy => "destroy",
            ActionVerb::WonRes => "won_RES",
            ActionVerb::WonEnl => "won_ENL",
            ActionVerb::Unknown => "unknown",
        }
    }

    /// Parse a stored verb string. Unknown values fall back to `unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "captured_RES" => ActionVerb::CapturedRes,
            "captured_ENL" => ActionVerb::CapturedEnl,
            "deploy_RES" => ActionVerb::DeployRes,
            "deploy_ENL" => ActionVerb::DeployEnl,
            "link_RES" => ActionVerb::LinkRes,
            "link_ENL" => ActionVerb::LinkEnl,
            "field_RES" => ActionVerb::FieldRes,
            "field_ENL" => ActionVerb::FieldEnl,
            "destroy" => ActionVerb::Destroy,
            "won_RES" => ActionVerb::WonRes,
            "won_ENL" => ActionVerb::WonEnl,
            _ => ActionVerb::Unknown,
        }
    }

    /// The faction a colored verb acts for. `None` for `destroy`/`unknown`.
    pub fn faction(&self) -> Option<Faction> {
        match self {
            ActionVerb::CapturedRes
            | ActionVerb::DeployRes
            | ActionVerb::LinkRes
            | ActionVerb::FieldRes
            | ActionVerb::WonRes => Some(Faction::Res),
            ActionVerb::CapturedEnl
            | ActionVerb::DeployEnl
            | ActionVerb::LinkEnl
            | ActionVerb::FieldEnl
            | ActionVerb::WonEnl => Some(Faction::Enl),
            ActionVerb::Destroy | ActionVerb::Unknown => None,
        }
    }

    /// True for `deploy_*` and `captured_*` — the verbs that put resonators
    /// on a portal.
    pub fn is_deploy_or_capture(&self) -> bool {
        matches!(
            self,
            ActionVerb::CapturedRes
                | ActionVerb::CapturedEnl
                | ActionVerb::DeployRes
                | ActionVerb::DeployEnl
        )
    }

    pub fn is_link(&self) -> bool {
        matches!(self, ActionVerb::LinkRes | ActionVerb::LinkEnl)
    }

    pub fn is_won(&self) -> bool {
        matches!(self, ActionVerb::WonRes | ActionVerb::WonEnl)
    }

    pub fn captured(f: Faction) -> Self {
        match f {
            Faction::Res => ActionVerb::CapturedRes,
            Faction::Enl => ActionVerb::CapturedEnl,
            _ => ActionVerb::Unknown,
        }
    }

    pub fn deploy(f: Faction) -> Self {
        match f {
            Faction::Res => ActionVerb::DeployRes,
            Faction::Enl => ActionVerb::DeployEnl,
            _ => ActionVerb::Unknown,
        }
    }

    pub fn link(f: Faction) -> Self {
        match f {
            Faction::Res => ActionVerb::LinkRes,
            Faction::Enl => ActionVerb::LinkEnl,
            _ => ActionVerb::Unknown,
        }
    }

    pub fn field(f: Faction) -> Self {
        match f {
            Faction::Res => ActionVerb::FieldRes,
            Faction::Enl => ActionVerb::FieldEnl,
            _ => ActionVerb::Unknown,
        }
    }

    pub fn won(f: Faction) -> Self {
        match f {
            Faction::Res => ActionVerb::WonRes,
            Faction::Enl => ActionVerb::WonEnl,
            _ => ActionVerb::Unknown,
        }
    }
}

impl std::fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One normalized feed event, persisted once and replayed any number of times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The feed's stable event identifier
    pub id: String,
    /// Event time, epoch milliseconds
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub action: ActionVerb,
    /// First referenced portal (acting portal / link origin)
    pub portal_id: Option<String>,
    /// Second referenced portal (link destination)
    pub target_portal_id: Option<String>,
}

/// Portal catalog entry. `team` is the first-observed value the feed reported
/// at normalization time — advisory only; the simulator derives ownership
/// from action verbs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub address: String,
    pub team: Faction,
}

// ── Canonical link key ────────────────────────────────────────────────────────

/// Canonical key for an unordered portal pair: the two ids sorted
/// lexicographically, joined by `-`. `{a,b}` and `{b,a}` collapse to one key.
pub fn link_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}-{b}")
    } else {
        format!("{b}-{a}")
    }
}

// ── World Snapshot (simulator → renderer) ─────────────────────────────────────

/// Portal as rendered: position plus current simulated team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalView {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub team: Faction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkView {
    pub p1: String,
    pub p2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub p1: String,
    pub p2: String,
    pub p3: String,
    pub team: Faction,
}

/// Full visible state at one instant, handed to the renderer with a display
/// timestamp. Contains no pixel or styling concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub portals: Vec<PortalView>,
    pub links: Vec<LinkView>,
    pub fields: Vec<FieldView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_round_trip_their_wire_strings() {
        let verbs = [
            ActionVerb::CapturedRes,
            ActionVerb::CapturedEnl,
            ActionVerb::DeployRes,
            ActionVerb::DeployEnl,
            ActionVerb::LinkRes,
            ActionVerb::LinkEnl,
            ActionVerb::FieldRes,
            ActionVerb::FieldEnl,
            ActionVerb::Destroy,
            ActionVerb::WonRes,
            ActionVerb::WonEnl,
            ActionVerb::Unknown,
        ];
        for v in verbs {
            assert_eq!(ActionVerb::parse(v.as_str()), v);
            let json = serde_json::to_string(&v).unwrap();
            assert_eq!(json, format!("\"{}\"", v.as_str()));
        }
    }

    #[test]
    fn verb_factions() {
        assert_eq!(ActionVerb::LinkRes.faction(), Some(Faction::Res));
        assert_eq!(ActionVerb::WonEnl.faction(), Some(Faction::Enl));
        assert_eq!(ActionVerb::Destroy.faction(), None);
        assert!(ActionVerb::DeployRes.is_deploy_or_capture());
        assert!(!ActionVerb::LinkRes.is_deploy_or_capture());
    }

    #[test]
    fn faction_team_mapping() {
        assert_eq!(Faction::from_team("RESISTANCE"), Faction::Res);
        assert_eq!(Faction::from_team("ENLIGHTENED"), Faction::Enl);
        assert_eq!(Faction::from_team("MACHINA"), Faction::Machina);
        assert_eq!(Faction::from_team("NONE"), Faction::Neutral);
    }

    #[test]
    fn link_key_is_order_independent() {
        assert_eq!(link_key("b", "a"), "a-b");
        assert_eq!(link_key("a", "b"), "a-b");
        assert_eq!(link_key("guid9.16", "guid10.16"), "guid10.16-guid9.16");
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = WorldSnapshot {
            portals: vec![PortalView {
                id: "p1".into(),
                lat: 52.5,
                lng: 13.4,
                team: Faction::Enl,
            }],
            links: vec![],
            fields: vec![],
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["portals"][0]["team"], "ENL");
    }
}
