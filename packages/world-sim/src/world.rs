//! world.rs — Replay state machine for portals, links, and fields
//!
//! The model starts from the portal catalog (everything neutral, zero
//! resonators) and mutates as normalized actions are applied in timestamp
//! order. Each [`WorldModel::process_action`] call reports whether it changed
//! anything the renderer would draw, so the replay driver can skip frames
//! that would be pixel-identical to the previous one.
//!
//! The feed is low-level and sometimes ambiguous: it reports destroy/deploy
//! *events* rather than resonator levels, and it can deliver links that cross
//! older ones. The model resolves both the same way the game's client does —
//! a resonator counter in `[0, 8]` stands in for per-resonator health (links
//! fail at ≤ 2, the portal neutralizes at 0), and a planarity sweep removes
//! any stored link that properly crosses a newer one.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use intel_types::{
    link_key, ActionKind, ActionRecord, ActionVerb, Faction, FieldView, LinkView, PortalRecord,
    PortalView, WorldSnapshot,
};

use crate::geometry::{cross, segments_properly_intersect, LatLng};

// ── Runtime state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimPortal {
    pos: LatLng,
    team: Faction,
}

/// Endpoints in canonical order (`p1 < p2`), matching the link's map key.
#[derive(Debug, Clone)]
struct SimLink {
    p1: String,
    p2: String,
}

#[derive(Debug, Clone)]
struct SimField {
    p1: String,
    p2: String,
    p3: String,
    team: Faction,
}

impl SimField {
    fn uses_edge(&self, a: &str, b: &str) -> bool {
        let edge = |x: &str, y: &str| (x == a && y == b) || (x == b && y == a);
        edge(&self.p1, &self.p2) || edge(&self.p2, &self.p3) || edge(&self.p3, &self.p1)
    }

    fn touches(&self, id: &str) -> bool {
        self.p1 == id || self.p2 == id || self.p3 == id
    }
}

/// In-memory world state driven by the normalized action log.
///
/// Ordered maps throughout: candidate enumeration, tie-breaking, and snapshot
/// output must not depend on hash order, or two replays of the same log could
/// diverge.
pub struct WorldModel {
    portals: BTreeMap<String, SimPortal>,
    resonators: BTreeMap<String, u8>,
    links: BTreeMap<String, SimLink>,
    fields: Vec<SimField>,
}

impl WorldModel {
    /// Build the runtime model from the portal catalog. Every portal starts
    /// neutral with zero resonators; history replay establishes ownership.
    pub fn new(catalog: &[PortalRecord]) -> Self {
        let portals = catalog
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    SimPortal {
                        pos: LatLng::new(p.lat, p.lng),
                        team: Faction::Neutral,
                    },
                )
            })
            .collect();
        Self {
            portals,
            resonators: BTreeMap::new(),
            links: BTreeMap::new(),
            fields: Vec::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn portal_team(&self, id: &str) -> Option<Faction> {
        self.portals.get(id).map(|p| p.team)
    }

    pub fn resonator_count(&self, id: &str) -> u8 {
        self.resonators.get(id).copied().unwrap_or(0)
    }

    pub fn has_link(&self, a: &str, b: &str) -> bool {
        self.links.contains_key(&link_key(a, b))
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn pos(&self, id: &str) -> Option<LatLng> {
        self.portals.get(id).map(|p| p.pos)
    }

    // ── Entry point ───────────────────────────────────────────────────────────

    /// Apply one action. Returns true iff visible state changed: a portal's
    /// team, or the link/field sets. Reinforcement deploys and resonator
    /// damage that stays above every threshold return false.
    pub fn process_action(&mut self, action: &ActionRecord) -> bool {
        if action.kind == ActionKind::Link && action.action == ActionVerb::Destroy {
            return self.apply_link_destroy(action);
        }
        if action.kind == ActionKind::Reso && action.action == ActionVerb::Destroy {
            return self.apply_resonator_destroy(action);
        }
        if action.action.is_deploy_or_capture() {
            return self.apply_deploy_or_capture(action);
        }
        if action.kind == ActionKind::Link && action.action.is_link() {
            return self.apply_link_creation(action);
        }
        if action.action.is_won() {
            return self.apply_beacon_outcome(action);
        }
        // Field events, mod destroys, portal neutralizations already implied
        // by resonator decay, and unknown records all fall through as no-ops.
        false
    }

    // ── Dispatch branches ─────────────────────────────────────────────────────

    fn apply_link_destroy(&mut self, action: &ActionRecord) -> bool {
        let (Some(a), Some(b)) = (action.portal_id.as_deref(), action.target_portal_id.as_deref())
        else {
            return false;
        };
        if !self.portals.contains_key(a) || !self.portals.contains_key(b) {
            return false;
        }
        self.remove_link(&link_key(a, b))
    }

    fn apply_resonator_destroy(&mut self, action: &ActionRecord) -> bool {
        let Some(id) = action.portal_id.as_deref() else {
            return false;
        };
        if !self.portals.contains_key(id) {
            return false;
        }
        let count = self.resonator_count(id).saturating_sub(1);
        self.resonators.insert(id.to_string(), count);

        let mut visible = false;
        if count <= 2 {
            // Too few resonators to sustain links
            visible |= self.remove_links_attached_to(id);
        }
        if count == 0 {
            visible |= self.set_team(id, Faction::Neutral);
        }
        visible
    }

    fn apply_deploy_or_capture(&mut self, action: &ActionRecord) -> bool {
        let Some(acting) = action.action.faction() else {
            return false;
        };
        let Some(id) = action.portal_id.as_deref() else {
            return false;
        };
        let Some(current) = self.portal_team(id) else {
            return false;
        };

        if current == Faction::Neutral {
            // Capture
            self.set_team(id, acting);
            self.resonators.insert(id.to_string(), 1);
            true
        } else if current != acting {
            // Faction flip: the portal changes hands and every incident link
            // (with its dependent fields) dies with the old ownership.
            self.set_team(id, acting);
            self.resonators.insert(id.to_string(), 1);
            self.remove_links_attached_to(id);
            true
        } else {
            // Reinforcement
            let count = self.resonator_count(id);
            self.resonators.insert(id.to_string(), (count + 1).min(8));
            false
        }
    }

    fn apply_link_creation(&mut self, action: &ActionRecord) -> bool {
        let Some(acting) = action.action.faction() else {
            return false;
        };
        let (Some(a), Some(b)) = (action.portal_id.as_deref(), action.target_portal_id.as_deref())
        else {
            return false;
        };
        if a == b || !self.portals.contains_key(a) || !self.portals.contains_key(b) {
            return false;
        }

        // A link proves both endpoints belong to the acting faction, whatever
        // the replayed state currently believes. It also implies at least the
        // minimum link-sustaining resonator complement on both portals, even
        // when the deploys never reached the feed.
        let mut visible = self.set_team(a, acting);
        visible |= self.set_team(b, acting);
        self.ensure_link_capable(a);
        self.ensure_link_capable(b);

        let key = link_key(a, b);
        if self.links.contains_key(&key) {
            return visible;
        }
        let (Some(pa), Some(pb)) = (self.pos(a), self.pos(b)) else {
            return visible;
        };

        // Planarity sweep: the newer link wins, every stored link properly
        // crossing it is removed. Links sharing an endpoint id never cross.
        let crossing: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| {
                if link.p1 == a || link.p1 == b || link.p2 == a || link.p2 == b {
                    return false;
                }
                match (self.pos(&link.p1), self.pos(&link.p2)) {
                    (Some(pc), Some(pd)) => segments_properly_intersect(pa, pb, pc, pd),
                    _ => false,
                }
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in &crossing {
            debug!("link {key} crosses {k}, removing older link");
            self.remove_link(k);
            visible = true;
        }

        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.links.insert(
            key,
            SimLink {
                p1: first.to_string(),
                p2: second.to_string(),
            },
        );
        visible = true;

        // Field creation: at most one field per side of the new edge — the
        // common neighbor spanning the largest triangle on that side.
        for third in self.pick_field_thirds(a, b, pa, pb) {
            debug!("field formed: {a} {b} {third}");
            self.fields.push(SimField {
                p1: a.to_string(),
                p2: b.to_string(),
                p3: third,
                team: acting,
            });
            visible = true;
        }
        visible
    }

    fn apply_beacon_outcome(&mut self, action: &ActionRecord) -> bool {
        let Some(winner) = action.action.faction() else {
            return false;
        };
        let Some(id) = action.portal_id.as_deref() else {
            return false;
        };
        let Some(current) = self.portal_team(id) else {
            return false;
        };

        let mut visible = false;
        if current != Faction::Neutral && current != winner {
            visible |= self.remove_links_attached_to(id);
        }
        visible |= self.set_team(id, winner);
        visible
    }

    // ── Primitives ────────────────────────────────────────────────────────────

    /// Links fail when a portal drops to 2 resonators or fewer, so a portal
    /// carrying a link must hold at least 3.
    fn ensure_link_capable(&mut self, id: &str) {
        let count = self.resonator_count(id);
        if count < 3 {
            self.resonators.insert(id.to_string(), 3);
        }
    }

    fn set_team(&mut self, id: &str, team: Faction) -> bool {
        match self.portals.get_mut(id) {
            Some(portal) if portal.team != team => {
                portal.team = team;
                true
            }
            _ => false,
        }
    }

    /// Remove one link and every field depending on that edge. Returns true
    /// if the link existed.
    fn remove_link(&mut self, key: &str) -> bool {
        let Some(link) = self.links.remove(key) else {
            return false;
        };
        let before = self.fields.len();
        self.fields.retain(|f| !f.uses_edge(&link.p1, &link.p2));
        let dropped = before - self.fields.len();
        if dropped > 0 {
            debug!("link {key} removed with {dropped} dependent field(s)");
        }
        true
    }

    /// Remove every link incident to `id`, then scrub any residual field
    /// still touching the portal (states persisted before the edge-dependency
    /// rule existed can contain such fields).
    fn remove_links_attached_to(&mut self, id: &str) -> bool {
        let incident: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| link.p1 == id || link.p2 == id)
            .map(|(k, _)| k.clone())
            .collect();

        let mut changed = false;
        for key in &incident {
            changed |= self.remove_link(key);
        }

        let before = self.fields.len();
        self.fields.retain(|f| !f.touches(id));
        changed |= self.fields.len() != before;
        changed
    }

    /// Common neighbors of the new edge `a-b`, partitioned by side; per
    /// non-empty side, the neighbor spanning the largest triangle. Candidates
    /// are visited in id order and compared strictly, so area ties resolve to
    /// the lexicographically smaller id.
    fn pick_field_thirds(&self, a: &str, b: &str, pa: LatLng, pb: LatLng) -> Vec<String> {
        let na = self.neighbors_of(a);
        let nb = self.neighbors_of(b);

        let mut best_pos: Option<(String, f64)> = None;
        let mut best_neg: Option<(String, f64)> = None;
        for n in na.intersection(&nb) {
            let Some(pn) = self.pos(n) else {
                continue;
            };
            let orient = cross(pa, pb, pn);
            if orient > 0.0 {
                if best_pos.as_ref().map_or(true, |(_, area)| orient > *area) {
                    best_pos = Some((n.clone(), orient));
                }
            } else if orient < 0.0 {
                let area = -orient;
                if best_neg.as_ref().map_or(true, |(_, a0)| area > *a0) {
                    best_neg = Some((n.clone(), area));
                }
            }
        }

        best_pos
            .into_iter()
            .chain(best_neg)
            .map(|(id, _)| id)
            .collect()
    }

    fn neighbors_of(&self, id: &str) -> BTreeSet<String> {
        self.links
            .values()
            .filter_map(|link| {
                if link.p1 == id {
                    Some(link.p2.clone())
                } else if link.p2 == id {
                    Some(link.p1.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    // ── Snapshot ──────────────────────────────────────────────────────────────

    /// Current visible state, portals in id order. Carries no candidate-
    /// selection leftovers; exactly what the renderer needs.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            portals: self
                .portals
                .iter()
                .map(|(id, p)| PortalView {
                    id: id.clone(),
                    lat: p.pos.lat,
                    lng: p.pos.lng,
                    team: p.team,
                })
                .collect(),
            links: self
                .links
                .values()
                .map(|link| LinkView {
                    p1: link.p1.clone(),
                    p2: link.p2.clone(),
                })
                .collect(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldView {
                    p1: f.p1.clone(),
                    p2: f.p2.clone(),
                    p3: f.p3.clone(),
                    team: f.team,
                })
                .collect(),
        }
    }
}
