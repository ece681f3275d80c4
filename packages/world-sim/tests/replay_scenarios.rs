//! End-to-end replay scenarios against the world model, with the structural
//! invariants re-checked after every applied action:
//!
//! - link endpoints exist in the portal catalog
//! - links are pairwise non-crossing (shared endpoints aside)
//! - every field's three edges are present in the link set
//! - a portal at ≤ 2 resonators has no incident links
//! - a neutral portal has zero resonators
//! - link keys are canonical and unique

use std::collections::{BTreeMap, BTreeSet};

use intel_types::{
    link_key, ActionKind, ActionRecord, ActionVerb, Faction, PortalRecord, WorldSnapshot,
};
use world_sim::{segments_properly_intersect, LatLng, WorldModel};

// ── Fixture helpers ───────────────────────────────────────────────────────────

fn catalog(ids: &[(&str, f64, f64)]) -> Vec<PortalRecord> {
    ids.iter()
        .map(|(id, lat, lng)| PortalRecord {
            id: id.to_string(),
            lat: *lat,
            lng: *lng,
            name: format!("Portal {id}"),
            address: String::new(),
            team: Faction::Neutral,
        })
        .collect()
}

struct Feed {
    seq: u64,
    actions: Vec<ActionRecord>,
}

impl Feed {
    fn new() -> Self {
        Self {
            seq: 0,
            actions: Vec::new(),
        }
    }

    fn push(&mut self, kind: ActionKind, verb: ActionVerb, p: Option<&str>, tp: Option<&str>) {
        self.seq += 1;
        self.actions.push(ActionRecord {
            id: format!("ev{:04}", self.seq),
            timestamp: self.seq as i64 * 1000,
            kind,
            action: verb,
            portal_id: p.map(str::to_string),
            target_portal_id: tp.map(str::to_string),
        });
    }

    fn captured(&mut self, f: Faction, p: &str) {
        self.push(ActionKind::Portal, ActionVerb::captured(f), Some(p), None);
    }

    fn deploy(&mut self, f: Faction, p: &str) {
        self.push(ActionKind::Reso, ActionVerb::deploy(f), Some(p), None);
    }

    fn link(&mut self, f: Faction, a: &str, b: &str) {
        self.push(ActionKind::Link, ActionVerb::link(f), Some(a), Some(b));
    }

    fn destroy_reso(&mut self, p: &str) {
        self.push(ActionKind::Reso, ActionVerb::Destroy, Some(p), None);
    }
}

fn apply_checked(model: &mut WorldModel, action: &ActionRecord) -> bool {
    let visible = model.process_action(action);
    assert_invariants(model, &action.id);
    visible
}

fn replay(model: &mut WorldModel, feed: &Feed) -> Vec<bool> {
    feed.actions
        .iter()
        .map(|a| apply_checked(model, a))
        .collect()
}

// ── Invariant checks ──────────────────────────────────────────────────────────

fn assert_invariants(model: &WorldModel, after: &str) {
    let snap = model.snapshot();
    let coords: BTreeMap<&str, LatLng> = snap
        .portals
        .iter()
        .map(|p| (p.id.as_str(), LatLng::new(p.lat, p.lng)))
        .collect();

    // Link endpoints exist, keys are canonical and unique
    let mut keys = BTreeSet::new();
    for l in &snap.links {
        assert!(
            coords.contains_key(l.p1.as_str()) && coords.contains_key(l.p2.as_str()),
            "after {after}: link {}-{} references unknown portal",
            l.p1,
            l.p2
        );
        assert!(l.p1 < l.p2, "after {after}: link {}-{} not canonical", l.p1, l.p2);
        assert!(
            keys.insert(link_key(&l.p1, &l.p2)),
            "after {after}: duplicate link {}-{}",
            l.p1,
            l.p2
        );
    }

    // Pairwise non-crossing
    for (i, l1) in snap.links.iter().enumerate() {
        for l2 in &snap.links[i + 1..] {
            if l1.p1 == l2.p1 || l1.p1 == l2.p2 || l1.p2 == l2.p1 || l1.p2 == l2.p2 {
                continue;
            }
            assert!(
                !segments_properly_intersect(
                    coords[l1.p1.as_str()],
                    coords[l1.p2.as_str()],
                    coords[l2.p1.as_str()],
                    coords[l2.p2.as_str()],
                ),
                "after {after}: links {}-{} and {}-{} cross",
                l1.p1,
                l1.p2,
                l2.p1,
                l2.p2
            );
        }
    }

    // Every field edge is a live link
    for f in &snap.fields {
        for (a, b) in [(&f.p1, &f.p2), (&f.p2, &f.p3), (&f.p3, &f.p1)] {
            assert!(
                keys.contains(&link_key(a, b)),
                "after {after}: field {}-{}-{} misses edge {a}-{b}",
                f.p1,
                f.p2,
                f.p3
            );
        }
    }

    // Resonator thresholds
    for p in &snap.portals {
        let count = model.resonator_count(&p.id);
        if count <= 2 {
            assert!(
                snap.links.iter().all(|l| l.p1 != p.id && l.p2 != p.id),
                "after {after}: portal {} has {count} resonators but incident links",
                p.id
            );
        }
        if p.team == Faction::Neutral {
            assert_eq!(
                count, 0,
                "after {after}: neutral portal {} has resonators",
                p.id
            );
        }
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn clean_capture() {
    let mut model = WorldModel::new(&catalog(&[
        ("A", 0.0, 0.0),
        ("B", 0.0, 2.0),
        ("C", 2.0, 1.0),
    ]));
    let mut feed = Feed::new();
    feed.captured(Faction::Enl, "A");

    let visible = replay(&mut model, &feed);
    assert_eq!(visible, vec![true]);
    assert_eq!(model.portal_team("A"), Some(Faction::Enl));
    assert_eq!(model.resonator_count("A"), 1);
    assert_eq!(model.link_count(), 0);
    assert_eq!(model.field_count(), 0);
}

#[test]
fn triangle_forms_exactly_one_field() {
    let mut model = WorldModel::new(&catalog(&[
        ("A", 0.0, 0.0),
        ("B", 0.0, 2.0),
        ("C", 2.0, 1.0),
    ]));
    let mut feed = Feed::new();
    feed.captured(Faction::Enl, "A");
    feed.captured(Faction::Enl, "B");
    feed.captured(Faction::Enl, "C");
    feed.link(Faction::Enl, "A", "B");
    feed.link(Faction::Enl, "B", "C");
    feed.link(Faction::Enl, "A", "C");

    let visible = replay(&mut model, &feed);
    assert!(visible.iter().all(|v| *v));
    assert_eq!(model.link_count(), 3);

    let snap = model.snapshot();
    assert_eq!(snap.fields.len(), 1);
    let field = &snap.fields[0];
    let mut verts = [field.p1.as_str(), field.p2.as_str(), field.p3.as_str()];
    verts.sort_unstable();
    assert_eq!(verts, ["A", "B", "C"]);
    assert_eq!(field.team, Faction::Enl);
}

#[test]
fn planarity_sweep_removes_older_crossing_link() {
    // Convex quadrilateral P, Q, R, S; the two diagonals cross.
    let mut model = WorldModel::new(&catalog(&[
        ("P", 0.0, 0.0),
        ("Q", 0.0, 2.0),
        ("R", 2.0, 2.0),
        ("S", 2.0, 0.0),
    ]));
    let mut feed = Feed::new();
    // Triangle P-Q-R so the P-R diagonal carries a field
    feed.link(Faction::Res, "P", "Q");
    feed.link(Faction::Res, "Q", "R");
    feed.link(Faction::Res, "P", "R");
    assert_eq!(replay(&mut model, &feed).len(), 3);
    assert!(model.has_link("P", "R"));
    assert_eq!(model.field_count(), 1);

    // The other diagonal: newer link wins, the old one dies with its field
    let mut cross_feed = Feed::new();
    cross_feed.link(Faction::Res, "Q", "S");
    let visible = replay(&mut model, &cross_feed);
    assert_eq!(visible, vec![true]);
    assert!(model.has_link("Q", "S"));
    assert!(!model.has_link("P", "R"));
    assert_eq!(model.field_count(), 0);
    assert!(model.has_link("P", "Q"));
    assert!(model.has_link("Q", "R"));
}

#[test]
fn faction_flip_removes_all_incident_links_and_fields() {
    let mut model = WorldModel::new(&catalog(&[
        ("A", 0.0, 0.0),
        ("B", 0.0, 2.0),
        ("C", 2.0, 1.0),
    ]));
    let mut feed = Feed::new();
    feed.captured(Faction::Enl, "A");
    for _ in 0..4 {
        feed.deploy(Faction::Enl, "A");
    }
    feed.captured(Faction::Enl, "B");
    feed.captured(Faction::Enl, "C");
    feed.link(Faction::Enl, "A", "B");
    feed.link(Faction::Enl, "A", "C");
    feed.link(Faction::Enl, "B", "C");
    replay(&mut model, &feed);
    assert_eq!(model.resonator_count("A"), 5);
    assert_eq!(model.link_count(), 3);
    assert_eq!(model.field_count(), 1);

    // Hostile deploy on an enemy portal is a flip
    let mut flip = Feed::new();
    flip.deploy(Faction::Res, "A");
    let visible = replay(&mut model, &flip);
    assert_eq!(visible, vec![true]);
    assert_eq!(model.portal_team("A"), Some(Faction::Res));
    assert_eq!(model.resonator_count("A"), 1);
    assert!(!model.has_link("A", "B"));
    assert!(!model.has_link("A", "C"));
    assert!(model.has_link("B", "C"));
    assert_eq!(model.field_count(), 0);
}

#[test]
fn resonator_decay_neutralizes_in_stages() {
    let mut model = WorldModel::new(&catalog(&[("A", 0.0, 0.0), ("B", 0.0, 2.0)]));
    let mut feed = Feed::new();
    feed.captured(Faction::Enl, "A");
    feed.deploy(Faction::Enl, "A");
    feed.deploy(Faction::Enl, "A");
    feed.captured(Faction::Enl, "B");
    feed.link(Faction::Enl, "A", "B");
    replay(&mut model, &feed);
    assert_eq!(model.resonator_count("A"), 3);
    assert!(model.has_link("A", "B"));

    let mut decay = Feed::new();
    decay.destroy_reso("A");
    decay.destroy_reso("A");
    decay.destroy_reso("A");
    let visible = replay(&mut model, &decay);

    // 3 → 2: the link threshold fires; 2 → 1: nothing visible; 1 → 0: neutral
    assert_eq!(visible, vec![true, false, true]);
    assert_eq!(model.link_count(), 0);
    assert_eq!(model.portal_team("A"), Some(Faction::Neutral));
    assert_eq!(model.resonator_count("A"), 0);
}

#[test]
fn replay_is_deterministic() {
    let portals = catalog(&[
        ("A", 0.0, 0.0),
        ("B", 0.0, 3.0),
        ("C", 3.0, 1.5),
        ("D", 1.0, 1.5),
        ("E", -2.0, 1.5),
    ]);
    let mut feed = Feed::new();
    feed.captured(Faction::Enl, "A");
    feed.captured(Faction::Enl, "B");
    feed.captured(Faction::Enl, "C");
    feed.captured(Faction::Enl, "D");
    feed.link(Faction::Enl, "A", "B");
    feed.link(Faction::Enl, "B", "C");
    feed.link(Faction::Enl, "A", "C");
    feed.deploy(Faction::Res, "D");
    feed.link(Faction::Res, "D", "E");
    feed.destroy_reso("C");
    feed.destroy_reso("C");
    feed.push(
        ActionKind::BattleBeacon,
        ActionVerb::WonRes,
        Some("B"),
        None,
    );

    let run = |portals: &[PortalRecord], feed: &Feed| -> (WorldSnapshot, Vec<bool>) {
        let mut model = WorldModel::new(portals);
        let flags = replay(&mut model, feed);
        (model.snapshot(), flags)
    };

    let (snap1, flags1) = run(&portals, &feed);
    let (snap2, flags2) = run(&portals, &feed);
    assert_eq!(flags1, flags2);
    assert_eq!(snap1, snap2);
}
