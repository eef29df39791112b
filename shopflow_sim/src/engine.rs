//! The "FLOW" Engine - Synthetic Customer Simulation
//!
//! Walks seeded agents through the store's zone graph. Each agent follows
//! a repeating cycle: pick a destination zone from the transition matrix,
//! walk there in a straight line, dwell, pick again. Agents leave when
//! they arrive in an exit zone or overstay the visit TTL.
//!
//! Determinism contract: with the same store, config and seed, a sequence
//! of identical `spawn`/`tick` calls yields byte-identical snapshots.
//! Agents step in ascending id order from a single ChaCha8 stream, so no
//! iteration-order entropy leaks into trajectories.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use shopflow_core::{RealPosition, StoreModel, ZoneId};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning knobs for the flow simulation.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Hard cap on concurrently live agents
    pub max_agents: usize,

    /// Base walking speed in m/s
    pub walk_speed: f64,

    /// Per-agent speed jitter as a fraction of walk_speed
    pub speed_jitter: f64,

    /// Distance at which an agent counts as having reached its target (m)
    pub arrival_radius: f64,

    /// Dwell time drawn uniformly from this range on each arrival (s)
    pub min_dwell_secs: f64,
    pub max_dwell_secs: f64,

    /// Extra pull toward exit zones per minute spent in the store.
    /// Exit-zone weights scale by (1 + bias * minutes) at each draw.
    pub exit_bias_per_min: f64,

    /// Agents still inside after this long are force-despawned (s)
    pub max_visit_secs: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_agents: 200,      // small-store ceiling
            walk_speed: 1.2,      // typical browsing pace
            speed_jitter: 0.25,   // +/- 25%
            arrival_radius: 0.4,  // close enough to a shelf
            min_dwell_secs: 2.0,
            max_dwell_secs: 15.0,
            exit_bias_per_min: 0.15,
            max_visit_secs: 1800.0, // 30 minute TTL
        }
    }
}

// ============================================================================
// AGENTS
// ============================================================================

/// Where an agent is in its walk cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Just spawned, picks up movement on the next tick
    Spawned,
    /// Walking in a straight line toward the target point
    Moving,
    /// Paused inside a zone until the dwell deadline
    Idle,
    /// Final tick before removal
    Despawning,
}

/// One synthetic customer.
#[derive(Debug, Clone)]
pub struct CustomerAgent {
    pub id: u64,
    pub position: RealPosition,
    /// Current node in the zone-graph walk
    pub current_zone: ZoneId,
    /// Destination node in the zone-graph walk
    pub target_zone: ZoneId,
    /// Concrete point inside the target zone the agent walks to
    pub target_point: RealPosition,
    /// This agent's walking speed in m/s
    pub speed: f64,
    pub state: AgentState,
    /// Simulation time when the agent entered the store (s)
    pub entered_at: f64,
    /// Simulation time when dwelling ends (s), meaningful in Idle
    pub dwell_until: f64,
}

/// Wire-friendly view of one agent for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u64,
    pub model_x: f64,
    pub model_z: f64,
    pub current_zone: ZoneId,
    pub target_zone: ZoneId,
    pub state: AgentState,
}

/// Why a spawn request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("store is at capacity ({limit} agents)")]
    CapacityExceeded { limit: usize },

    #[error("unknown spawn zone {0}")]
    UnknownZone(ZoneId),
}

// ============================================================================
// ENGINE
// ============================================================================

/// Tick-based agent simulation over a validated store model.
pub struct FlowEngine {
    config: FlowConfig,
    store: StoreModel,

    /// Live agents, keyed by id. BTreeMap keeps stepping order deterministic.
    agents: BTreeMap<u64, CustomerAgent>,

    rng: ChaCha8Rng,
    next_id: u64,

    /// Simulation time in seconds, advanced by `tick`
    time: f64,

    spawned_total: u64,
    despawned_total: u64,
}

impl FlowEngine {
    /// Creates an engine over `store` seeded with `seed`.
    pub fn new(store: StoreModel, config: FlowConfig, seed: u64) -> Self {
        Self {
            config,
            store,
            agents: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
            time: 0.0,
            spawned_total: 0,
            despawned_total: 0,
        }
    }

    /// Spawns a new agent inside `zone`.
    ///
    /// Refused when the store is at capacity or the zone does not exist;
    /// a refused spawn consumes no randomness, so rejected requests never
    /// perturb the trajectories of live agents.
    pub fn spawn(&mut self, zone: ZoneId) -> Result<u64, SpawnError> {
        if self.agents.len() >= self.config.max_agents {
            return Err(SpawnError::CapacityExceeded {
                limit: self.config.max_agents,
            });
        }
        let spawn_zone = self
            .store
            .zones
            .get(zone)
            .ok_or(SpawnError::UnknownZone(zone))?;

        let position = spawn_zone.sample_interior(&mut self.rng);

        let jitter = self.config.speed_jitter;
        let mut speed = self.config.walk_speed;
        if jitter > 0.0 {
            speed *= 1.0 + self.rng.gen_range(-jitter..=jitter);
        }
        let speed = speed.max(0.1);

        let target_zone = Self::draw_next_zone(&self.store, &self.config, &mut self.rng, zone, 0.0);
        let target_point = match self.store.zones.get(target_zone) {
            Some(z) => z.sample_interior(&mut self.rng),
            None => position,
        };

        let id = self.next_id;
        self.next_id += 1;
        self.spawned_total += 1;

        self.agents.insert(
            id,
            CustomerAgent {
                id,
                position,
                current_zone: zone,
                target_zone,
                target_point,
                speed,
                state: AgentState::Spawned,
                entered_at: self.time,
                dwell_until: self.time,
            },
        );

        Ok(id)
    }

    /// Removes an agent immediately. Returns false if the id is not live.
    pub fn despawn(&mut self, id: u64) -> bool {
        if self.agents.remove(&id).is_some() {
            self.despawned_total += 1;
            true
        } else {
            false
        }
    }

    /// Advances the simulation by `dt` seconds and returns a snapshot of
    /// every agent, ascending by id.
    ///
    /// Agents that reached an exit or exceeded the visit TTL appear in
    /// this tick's snapshot with state `Despawning` and are gone afterwards.
    pub fn tick(&mut self, dt: f64) -> Vec<AgentSnapshot> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.time += dt;
        let now = self.time;

        let ids: Vec<u64> = self.agents.keys().copied().collect();
        let mut departing: Vec<u64> = Vec::new();

        for id in ids {
            if let Some(agent) = self.agents.get_mut(&id) {
                let leaves =
                    Self::step_agent(&self.store, &self.config, &mut self.rng, agent, dt, now);
                if leaves {
                    agent.state = AgentState::Despawning;
                    departing.push(id);
                }
            }
        }

        let snapshots = self.snapshots();

        for id in &departing {
            self.agents.remove(id);
        }
        self.despawned_total += departing.len() as u64;

        snapshots
    }

    /// Steps one agent. Returns true when the agent should leave the store.
    fn step_agent(
        store: &StoreModel,
        config: &FlowConfig,
        rng: &mut ChaCha8Rng,
        agent: &mut CustomerAgent,
        dt: f64,
        now: f64,
    ) -> bool {
        if now - agent.entered_at > config.max_visit_secs {
            return true;
        }

        match agent.state {
            AgentState::Spawned => {
                agent.state = AgentState::Moving;
                false
            }

            AgentState::Idle => {
                if now >= agent.dwell_until {
                    let elapsed = now - agent.entered_at;
                    let next =
                        Self::draw_next_zone(store, config, rng, agent.current_zone, elapsed);
                    if let Some(zone) = store.zones.get(next) {
                        agent.target_zone = next;
                        agent.target_point = zone.sample_interior(rng);
                        agent.state = AgentState::Moving;
                    }
                }
                false
            }

            AgentState::Moving => {
                agent.position = agent.position.step_toward(&agent.target_point, agent.speed * dt);

                if agent.position.distance_to(&agent.target_point) <= config.arrival_radius {
                    agent.current_zone = agent.target_zone;

                    let at_exit = store
                        .zones
                        .get(agent.current_zone)
                        .map(|z| z.kind().is_exit())
                        .unwrap_or(false);
                    if at_exit {
                        return true;
                    }

                    agent.state = AgentState::Idle;
                    agent.dwell_until =
                        now + rng.gen_range(config.min_dwell_secs..=config.max_dwell_secs);
                }
                false
            }

            AgentState::Despawning => true,
        }
    }

    /// Draws the next zone from the transition matrix, with exit-zone
    /// weights scaled up by how long the agent has been in the store.
    fn draw_next_zone(
        store: &StoreModel,
        config: &FlowConfig,
        rng: &mut ChaCha8Rng,
        from: ZoneId,
        elapsed_secs: f64,
    ) -> ZoneId {
        let row = match store.transitions.row(from) {
            Some(row) => row,
            None => return from,
        };

        let bias = 1.0 + config.exit_bias_per_min * (elapsed_secs / 60.0);
        let weight = |zone: ZoneId, p: f64| -> f64 {
            let is_exit = store
                .zones
                .get(zone)
                .map(|z| z.kind().is_exit())
                .unwrap_or(false);
            if is_exit {
                p * bias
            } else {
                p
            }
        };

        let total: f64 = row.iter().map(|&(zone, p)| weight(zone, p)).sum();
        if total <= 0.0 {
            return from;
        }

        let mut u = rng.gen::<f64>() * total;
        for &(zone, p) in row {
            u -= weight(zone, p);
            if u <= 0.0 {
                return zone;
            }
        }

        // Rounding can leave a sliver past the last entry
        row.last().map(|&(zone, _)| zone).unwrap_or(from)
    }

    /// Snapshot of every live agent without advancing time.
    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents
            .values()
            .map(|agent| {
                let m = self.store.mapper.real_to_model(&agent.position);
                AgentSnapshot {
                    id: agent.id,
                    model_x: m.x(),
                    model_z: m.z(),
                    current_zone: agent.current_zone,
                    target_zone: agent.target_zone,
                    state: agent.state,
                }
            })
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, id: u64) -> Option<&CustomerAgent> {
        self.agents.get(&id)
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    pub fn despawned_total(&self) -> u64 {
        self.despawned_total
    }

    pub fn store(&self) -> &StoreModel {
        &self.store
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::demo_store_model;
    use proptest::prelude::*;

    const TICK: f64 = 1.0 / 30.0;

    fn engine_with(config: FlowConfig, seed: u64) -> FlowEngine {
        FlowEngine::new(demo_store_model(), config, seed)
    }

    #[test]
    fn test_spawn_places_agent_in_zone() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        let id = engine.spawn(ZoneId(2)).unwrap();

        let agent = engine.agent(id).unwrap();
        assert_eq!(agent.current_zone, ZoneId(2));
        assert_eq!(agent.state, AgentState::Spawned);

        let zone = engine.store().zones.get(ZoneId(2)).unwrap();
        assert!(zone.contains(&agent.position));
    }

    #[test]
    fn test_spawn_capacity_enforced() {
        let config = FlowConfig {
            max_agents: 2,
            ..Default::default()
        };
        let mut engine = engine_with(config, 42);

        engine.spawn(ZoneId(1)).unwrap();
        engine.spawn(ZoneId(1)).unwrap();
        assert_eq!(
            engine.spawn(ZoneId(1)),
            Err(SpawnError::CapacityExceeded { limit: 2 })
        );
        assert_eq!(engine.agent_count(), 2);
    }

    #[test]
    fn test_spawn_unknown_zone() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        assert_eq!(
            engine.spawn(ZoneId(99)),
            Err(SpawnError::UnknownZone(ZoneId(99)))
        );
    }

    #[test]
    fn test_despawn_is_idempotent() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        let id = engine.spawn(ZoneId(1)).unwrap();

        assert!(engine.despawn(id));
        assert!(!engine.despawn(id));
        assert_eq!(engine.agent_count(), 0);
        assert_eq!(engine.despawned_total(), 1);
    }

    #[test]
    fn test_tick_moves_no_faster_than_speed() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        let id = engine.spawn(ZoneId(1)).unwrap();

        // First tick only flips Spawned -> Moving
        engine.tick(TICK);

        for _ in 0..300 {
            let before = engine.agent(id).map(|a| (a.position, a.speed, a.state));
            engine.tick(TICK);
            let (p0, speed, state) = match before {
                Some(v) => v,
                None => break, // left the store
            };
            if state != AgentState::Moving {
                continue;
            }
            if let Some(agent) = engine.agent(id) {
                assert!(p0.distance_to(&agent.position) <= speed * TICK + 1e-9);
            }
        }
    }

    #[test]
    fn test_exit_arrival_despawns() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        let id = engine.spawn(ZoneId(5)).unwrap();

        // Aim the agent straight at the exit corridor
        {
            let agent = engine.agents.get_mut(&id).unwrap();
            agent.state = AgentState::Moving;
            agent.position = RealPosition::new(19.0, 6.0);
            agent.target_zone = ZoneId(7);
            agent.target_point = RealPosition::new(22.0, 6.0);
        }

        // One big tick covers the remaining 3 m walk
        let snapshots = engine.tick(5.0);
        let snap = snapshots.iter().find(|s| s.id == id).unwrap();
        assert_eq!(snap.state, AgentState::Despawning);
        assert_eq!(snap.current_zone, ZoneId(7));

        assert_eq!(engine.agent_count(), 0);
        assert_eq!(engine.despawned_total(), 1);
    }

    #[test]
    fn test_visit_ttl_forces_despawn() {
        let config = FlowConfig {
            max_visit_secs: 1.0,
            ..Default::default()
        };
        let mut engine = engine_with(config, 42);
        engine.spawn(ZoneId(1)).unwrap();

        let snapshots = engine.tick(2.0);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, AgentState::Despawning);
        assert_eq!(engine.agent_count(), 0);
    }

    #[test]
    fn test_agent_state_wire_vocabulary() {
        for (state, wire) in [
            (AgentState::Spawned, "\"spawned\""),
            (AgentState::Moving, "\"moving\""),
            (AgentState::Idle, "\"idle\""),
            (AgentState::Despawning, "\"despawning\""),
        ] {
            assert_eq!(serde_json::to_string(&state).unwrap(), wire);
        }
    }

    #[test]
    fn test_zero_dt_tick_is_a_no_op_for_positions() {
        let mut engine = engine_with(FlowConfig::default(), 42);
        let id = engine.spawn(ZoneId(1)).unwrap();
        engine.tick(TICK);

        let p0 = engine.agent(id).unwrap().position;
        engine.tick(0.0);
        let p1 = engine.agent(id).unwrap().position;
        assert_eq!(p0.distance_to(&p1), 0.0);
    }

    #[test]
    fn test_same_seed_identical_trajectories() {
        let mut a = engine_with(FlowConfig::default(), 7);
        let mut b = engine_with(FlowConfig::default(), 7);

        for zone in [1, 1, 2, 3] {
            a.spawn(ZoneId(zone)).unwrap();
            b.spawn(ZoneId(zone)).unwrap();
        }

        for _ in 0..200 {
            let sa = serde_json::to_string(&a.tick(TICK)).unwrap();
            let sb = serde_json::to_string(&b.tick(TICK)).unwrap();
            assert_eq!(sa, sb);
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = engine_with(FlowConfig::default(), 1);
        let mut b = engine_with(FlowConfig::default(), 2);

        a.spawn(ZoneId(1)).unwrap();
        b.spawn(ZoneId(1)).unwrap();

        let mut diverged = false;
        for _ in 0..200 {
            let sa = serde_json::to_string(&a.tick(TICK)).unwrap();
            let sb = serde_json::to_string(&b.tick(TICK)).unwrap();
            if sa != sb {
                diverged = true;
                break;
            }
        }
        assert!(diverged);
    }

    proptest! {
        #[test]
        fn prop_capacity_never_exceeded(seed in any::<u64>(), attempts in 1usize..40) {
            let config = FlowConfig { max_agents: 5, ..Default::default() };
            let mut engine = engine_with(config, seed);

            for _ in 0..attempts {
                let _ = engine.spawn(ZoneId(1));
                prop_assert!(engine.agent_count() <= 5);
            }
        }

        #[test]
        fn prop_same_seed_same_final_state(seed in any::<u64>(), ticks in 1usize..100) {
            let mut a = engine_with(FlowConfig::default(), seed);
            let mut b = engine_with(FlowConfig::default(), seed);

            for zone in [1, 2, 3] {
                a.spawn(ZoneId(zone)).unwrap();
                b.spawn(ZoneId(zone)).unwrap();
            }
            for _ in 0..ticks {
                a.tick(TICK);
                b.tick(TICK);
            }

            let sa = serde_json::to_string(&a.snapshots()).unwrap();
            let sb = serde_json::to_string(&b.snapshots()).unwrap();
            prop_assert_eq!(sa, sb);
        }
    }
}
