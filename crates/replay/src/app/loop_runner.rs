use std::process::ExitCode;
use std::time::Duration;

use presence::{
    OcclusionOracle, PresenceConfig, RegionMap, Roster, RosterEvent, SceneGraph, TileOracle,
    WaterTilemap,
};
use tracing::{debug, info, warn};

use super::bootstrap::AppWiring;
use super::scenario::Scenario;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) frames: u64,
    pub(crate) ticks: u64,
    pub(crate) messages_applied: usize,
    pub(crate) messages_rejected: usize,
    pub(crate) spawned: usize,
    pub(crate) destroyed: usize,
    pub(crate) remaining_entities: usize,
    pub(crate) remaining_visuals: usize,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let summary = replay(
        &app.config,
        &app.scenario,
        app.water.as_ref(),
        &app.occlusion,
    );
    info!(
        frames = summary.frames,
        ticks = summary.ticks,
        messages_applied = summary.messages_applied,
        messages_rejected = summary.messages_rejected,
        spawned = summary.spawned,
        destroyed = summary.destroyed,
        remaining_entities = summary.remaining_entities,
        remaining_visuals = summary.remaining_visuals,
        "replay_finished"
    );
    ExitCode::SUCCESS
}

/// Drives the roster with a fixed simulation step fed by simulated frames.
pub(crate) fn replay(
    config: &PresenceConfig,
    scenario: &Scenario,
    water: Option<&WaterTilemap>,
    occlusion: &RegionMap,
) -> ReplaySummary {
    let mut roster = Roster::new(config.clone(), scenario.seed);
    if let Some(local) = &scenario.local_session_id {
        roster = roster.with_local_session(local.clone());
    }
    let mut scene = SceneGraph::with_animations(scenario.animation_keys(&config.animation));
    for texture in &scenario.missing_textures {
        scene.mark_texture_missing(texture.clone());
    }
    let tiles = water.map(|map| map as &dyn TileOracle);
    let regions: Option<&dyn OcclusionOracle> = Some(occlusion);

    let fixed_dt = Duration::from_secs_f64(scenario.tick_ms / 1000.0);
    let frame_dt = Duration::from_secs_f64(scenario.frame_ms() / 1000.0);
    let mut summary = ReplaySummary::default();
    let mut backlog = Duration::ZERO;
    let mut now_ms = 0.0f64;
    let mut next_event = 0usize;
    let mut next_snapshot_ms = scenario.snapshot_interval_ms;

    while now_ms < scenario.duration_ms {
        summary.frames += 1;
        backlog = backlog.saturating_add(frame_dt);
        let budget = TickBudget::plan(backlog, fixed_dt, scenario.max_ticks_per_frame);
        for _ in 0..budget.ticks {
            now_ms += scenario.tick_ms;
            while let Some(timed) = scenario.events.get(next_event) {
                if timed.at_ms > now_ms {
                    break;
                }
                next_event += 1;
                match roster.apply(&timed.message, now_ms, &mut scene) {
                    Ok(()) => summary.messages_applied += 1,
                    Err(err) => {
                        summary.messages_rejected += 1;
                        warn!(
                            at_ms = timed.at_ms,
                            kind = timed.message.kind(),
                            session_id = %timed.message.session_id(),
                            error = %err,
                            "scenario_message_rejected"
                        );
                    }
                }
            }

            for event in roster.tick(scenario.tick_ms, now_ms, &mut scene, tiles, regions) {
                match event {
                    RosterEvent::Spawned { session_id } => {
                        summary.spawned += 1;
                        info!(session_id = %session_id, now_ms, "entity_spawned");
                    }
                    RosterEvent::Destroyed { session_id } => {
                        summary.destroyed += 1;
                        info!(session_id = %session_id, now_ms, "entity_destroyed");
                    }
                }
            }
            summary.ticks += 1;

            if now_ms >= next_snapshot_ms {
                log_snapshot(&roster, &scene, now_ms);
                next_snapshot_ms += scenario.snapshot_interval_ms;
            }
        }
        if !budget.dropped.is_zero() {
            warn!(
                dropped_ms = budget.dropped.as_secs_f64() * 1000.0,
                "tick_backlog_dropped"
            );
        }
        backlog = budget.carry;
    }

    summary.remaining_entities = roster.len();
    summary.remaining_visuals = scene.len();
    summary
}

fn log_snapshot(roster: &Roster, scene: &SceneGraph, now_ms: f64) {
    info!(
        now_ms,
        entities = roster.len(),
        visuals = scene.len(),
        draw_order = ?roster.draw_order(),
        interactable = ?roster.interactable_session_ids(now_ms),
        "replay_snapshot"
    );
    for entity in roster.entities() {
        let position = entity.rendered_position();
        debug!(
            session_id = %entity.session_id(),
            state = entity.state().label(),
            x = position.x,
            y = position.y,
            depth = entity.draw_depth(),
            alpha = entity.alpha(),
            submersion = entity.submersion().depth,
            nameplate = %entity.nameplate_text(),
            "entity_snapshot"
        );
    }
}

/// Fixed ticks owed by one simulated frame. Whole ticks past the per-frame
/// cap are dropped; the partial tick always carries into the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickBudget {
    ticks: u32,
    carry: Duration,
    dropped: Duration,
}

impl TickBudget {
    fn plan(backlog: Duration, tick: Duration, max_ticks: u32) -> Self {
        let tick_ns = tick.as_nanos().max(1);
        let backlog_ns = backlog.as_nanos();
        let due = backlog_ns / tick_ns;
        let ticks = due.min(u128::from(max_ticks));
        Self {
            ticks: u32::try_from(ticks).unwrap_or(max_ticks),
            carry: duration_from_nanos(backlog_ns % tick_ns),
            dropped: duration_from_nanos((due - ticks) * tick_ns),
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SCENARIO: &str = include_str!("../../scenarios/harbor_walk.json");

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn frame_runs_every_whole_tick_it_owes() {
        let budget = TickBudget::plan(ms(48), ms(16), 5);
        assert_eq!(
            budget,
            TickBudget {
                ticks: 3,
                carry: Duration::ZERO,
                dropped: Duration::ZERO,
            }
        );
    }

    #[test]
    fn partial_tick_carries_into_next_frame() {
        let budget = TickBudget::plan(ms(20), ms(16), 5);
        assert_eq!(budget.ticks, 1);
        assert_eq!(budget.carry, ms(4));

        let idle = TickBudget::plan(ms(10), ms(16), 5);
        assert_eq!(idle.ticks, 0);
        assert_eq!(idle.carry, ms(10));
    }

    #[test]
    fn ticks_past_the_frame_cap_are_dropped_but_the_remainder_is_kept() {
        let budget = TickBudget::plan(ms(120), ms(16), 3);
        assert_eq!(budget.ticks, 3);
        assert_eq!(budget.dropped, ms(64));
        assert_eq!(budget.carry, ms(8));
    }

    #[test]
    fn sample_scenario_spawns_and_despawns_cleanly() {
        let scenario = Scenario::from_json_str(SAMPLE_SCENARIO).expect("scenario");
        let water = scenario.water_map().expect("water");
        let config = PresenceConfig::default();
        let summary = replay(&config, &scenario, water.as_ref(), &scenario.occlusion);

        assert_eq!(summary.messages_rejected, 1);
        assert_eq!(summary.spawned, 1);
        assert_eq!(summary.destroyed, 2);
        assert_eq!(summary.remaining_entities, 1);
        assert!(summary.remaining_visuals >= 2);
    }

    #[test]
    fn replay_is_deterministic_for_a_seed() {
        let scenario = Scenario::from_json_str(SAMPLE_SCENARIO).expect("scenario");
        let water = scenario.water_map().expect("water");
        let config = PresenceConfig::default();
        let first = replay(&config, &scenario, water.as_ref(), &scenario.occlusion);
        let second = replay(&config, &scenario, water.as_ref(), &scenario.occlusion);
        assert_eq!(first, second);
    }
}
