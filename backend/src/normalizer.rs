//! normalizer.rs — raw comm-feed records → normalized actions
//!
//! The feed delivers each event as an opaque list-of-lists record:
//! `[event_id, timestamp_ms, {plext: {markup, text}}]`, where `markup` is an
//! ordered list of tagged tuples (`PLAYER`, `FACTION`, `PORTAL`, `TEXT`, …)
//! and `text` is the rendered human-readable line. Normalization strips
//! benign chatter, classifies the action verb by keyword, tags it with the
//! actor's faction, and extracts up to two referenced portals.
//!
//! Ambiguity is never an error here: a record with no recognizable verb, no
//! faction tag, or no portal markup normalizes to `unknown` / empty ids and
//! replays as a no-op.

use serde::Deserialize;

use intel_types::{ActionKind, ActionRecord, ActionVerb, Faction, PortalRecord};

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// One feed record: `[event_id, timestamp_ms, {plext: {…}}]`
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRecord(pub String, pub i64, pub PlextEnvelope);

impl FeedRecord {
    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn timestamp(&self) -> i64 {
        self.1
    }

    pub fn plext(&self) -> &Plext {
        &self.2.plext
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlextEnvelope {
    pub plext: Plext,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Plext {
    #[serde(default)]
    pub markup: Vec<MarkupEntry>,
    #[serde(default)]
    pub text: String,
}

/// Markup tuple: `["PORTAL", {…attrs}]`
#[derive(Debug, Clone, Deserialize)]
pub struct MarkupEntry(pub String, pub MarkupAttrs);

/// Union of the attributes the tags we care about carry. Tags we do not
/// recognize still parse — their attributes just stay unused.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarkupAttrs {
    pub plain: Option<String>,
    pub team: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "latE6")]
    pub lat_e6: Option<i64>,
    #[serde(rename = "lngE6")]
    pub lng_e6: Option<i64>,
    pub guid: Option<String>,
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// A normalized action plus the portal records its markup referenced.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub action: ActionRecord,
    pub portals: Vec<PortalRecord>,
}

/// Chatter with no territorial meaning, dropped outright.
const DROP_PHRASES: [&str; 3] = [
    "is under attack by",
    "Your Kinetic Capsule now ready",
    "Drone returned",
];

pub fn normalize_record(record: &FeedRecord) -> Option<NormalizedEvent> {
    let plext = record.plext();
    let text = plext.text.as_str();
    if DROP_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        return None;
    }

    let actor = first_team(&plext.markup, "PLAYER");
    let beacon = first_team(&plext.markup, "FACTION");
    let (kind, verb) = classify(text, actor, beacon);

    let portals = extract_portals(&plext.markup);
    let mut ids = portals.iter().map(|p| p.id.clone());
    Some(NormalizedEvent {
        action: ActionRecord {
            id: record.id().to_string(),
            timestamp: record.timestamp(),
            kind,
            action: verb,
            portal_id: ids.next(),
            target_portal_id: ids.next(),
        },
        portals,
    })
}

/// Keyword classification, first match wins. Destroy subtypes share one verb
/// and are told apart by the object keyword next to it.
fn classify(
    text: &str,
    actor: Option<Faction>,
    beacon: Option<Faction>,
) -> (ActionKind, ActionVerb) {
    if text.contains("destroyed") {
        let kind = if text.contains("Resonator") {
            ActionKind::Reso
        } else if text.contains("Link") {
            ActionKind::Link
        } else if text.contains("Control Field") {
            ActionKind::Field
        } else if text.contains("Mod") {
            ActionKind::Mod
        } else {
            ActionKind::Unknown
        };
        return (kind, ActionVerb::Destroy);
    }
    if text.contains("neutralized by") {
        return (ActionKind::Portal, ActionVerb::Destroy);
    }
    if text.contains("won a CAT-") {
        // Battle-beacon outcomes name the winner in a FACTION tag, not the
        // (possibly absent) player markup
        let verb = beacon.map(ActionVerb::won).unwrap_or_default();
        return (ActionKind::BattleBeacon, verb);
    }

    let Some(faction) = actor.filter(|f| matches!(f, Faction::Res | Faction::Enl)) else {
        return (ActionKind::Unknown, ActionVerb::Unknown);
    };
    if text.contains("deployed") {
        return (ActionKind::Reso, ActionVerb::deploy(faction));
    }
    if text.contains("linked") {
        return (ActionKind::Link, ActionVerb::link(faction));
    }
    if text.contains("created a Control Field") {
        return (ActionKind::Field, ActionVerb::field(faction));
    }
    if text.contains("captured") {
        return (ActionKind::Portal, ActionVerb::captured(faction));
    }
    (ActionKind::Unknown, ActionVerb::Unknown)
}

fn first_team(markup: &[MarkupEntry], tag: &str) -> Option<Faction> {
    markup
        .iter()
        .find(|entry| entry.0 == tag)
        .and_then(|entry| entry.1.team.as_deref())
        .map(Faction::from_team)
}

/// The first two PORTAL tags, in markup order. E6 integer coordinates become
/// signed decimal degrees here; the reported `team` is recorded as first-seen
/// metadata only.
fn extract_portals(markup: &[MarkupEntry]) -> Vec<PortalRecord> {
    markup
        .iter()
        .filter(|entry| entry.0 == "PORTAL")
        .take(2)
        .filter_map(|entry| {
            let attrs = &entry.1;
            Some(PortalRecord {
                id: attrs.guid.clone()?,
                lat: attrs.lat_e6? as f64 / 1_000_000.0,
                lng: attrs.lng_e6? as f64 / 1_000_000.0,
                name: attrs.name.clone().unwrap_or_default(),
                address: attrs.address.clone().unwrap_or_default(),
                team: attrs
                    .team
                    .as_deref()
                    .map(Faction::from_team)
                    .unwrap_or_default(),
            })
        })
        .collect()
}
