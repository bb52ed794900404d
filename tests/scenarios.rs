//! End-to-end behaviour of single ticks, the agent and the exporter

use glam::Vec2;

use skyfall::consts::{HEIGHT, WIDTH};
use skyfall::sim::{
    Action, BONUS_SPEC, DecisionPolicy, HAZARD_SPEC, Mode, Obstacle, ObstacleKind, Player, Session,
    SessionPhase, SpawnPolicy, TickConfig, TickInput, tick,
};
use skyfall::training::{DatasetExporter, Episode};

fn quiet_config() -> TickConfig {
    TickConfig {
        spawn: SpawnPolicy {
            spawn_chance: 0.0,
            bonus_chance: 0.0,
        },
        ..Default::default()
    }
}

fn running() -> Session {
    let mut session = Session::new("scenario-0001", 42);
    assert!(session.start(Mode::Human, "tester"));
    session
}

fn grounded_player() -> Player {
    let player = Player::default();
    Player::at(player.pos.x, player.ground_y())
}

fn step(session: &mut Session) -> skyfall::sim::TickReport {
    tick(
        session,
        &TickInput::default(),
        &DecisionPolicy::default(),
        &quiet_config(),
    )
    .unwrap()
    .unwrap()
}

#[test]
fn hazard_on_resting_player_ends_episode() {
    let mut session = running();
    session.player = grounded_player();
    session
        .obstacles
        .push(Obstacle::new(ObstacleKind::Hazard, session.player.pos));

    let report = step(&mut session);
    assert!(report.terminal);
    assert_eq!(report.reward, HAZARD_SPEC.terminal_reward);
    assert_eq!(report.reward, -100.0);
    assert_eq!(session.phase, SessionPhase::Terminal);

    let records = session.recorder.finished().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].done);

    // The loop stops ticking once Terminal
    let after = tick(
        &mut session,
        &TickInput::default(),
        &DecisionPolicy::default(),
        &quiet_config(),
    )
    .unwrap();
    assert!(after.is_none());
    assert_eq!(session.tick_count, 1);
}

#[test]
fn airborne_player_integrates_gravity() {
    let mut session = running();
    session.player = Player::at(200.0, 400.0);
    session.player.vy = -18.0;

    step(&mut session);
    assert_eq!(session.player.vy, -17.0);
    assert_eq!(session.player.pos.y, 383.0);
    assert!(session.is_running());
}

#[test]
fn bonus_is_consumed_without_ending_episode() {
    let mut session = running();
    session.player = grounded_player();
    let pos = session.player.pos + Vec2::splat(10.0);
    session.obstacles.push(Obstacle::new(ObstacleKind::Bonus, pos));

    let report = step(&mut session);
    assert_eq!(report.bonuses_collected, 1);
    assert!(session.obstacles.is_empty());
    assert_eq!(session.score, BONUS_SPEC.score_delta);
    assert!(session.is_running());
}

#[test]
fn obstacle_wraps_past_right_edge() {
    let mut session = running();
    session.obstacles.push(
        Obstacle::new(ObstacleKind::Hazard, Vec2::new(WIDTH - 1.0, 100.0)).with_drift(2.0),
    );

    step(&mut session);
    assert_eq!(session.obstacles[0].pos.x, -HAZARD_SPEC.size);
    assert_eq!(session.obstacles[0].pos.y, 100.0 + HAZARD_SPEC.fall_speed);
}

#[test]
fn agent_jumps_hazard_overhead() {
    let mut session = running();
    session.player = grounded_player();
    let above = session.player.pos - Vec2::new(0.0, 70.0);
    session.obstacles.push(Obstacle::new(ObstacleKind::Hazard, above));

    let policy = DecisionPolicy::default();
    assert_eq!(policy.decide(&session.view()), Action::Jump);
}

#[test]
fn autonomous_episode_exports_with_missing_frames() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    image::RgbImage::new(32, 24)
        .save(frames.join("frame_00000.png"))
        .unwrap();

    let mut session = Session::new("export-episode", 5);
    session.start(Mode::Autonomous, "bot");
    session.player = grounded_player();
    for _ in 0..3 {
        step(&mut session);
    }
    session
        .obstacles
        .push(Obstacle::new(ObstacleKind::Hazard, session.player.pos));
    step(&mut session);
    assert!(session.is_terminal());

    let episode = Episode::from_session(session).unwrap();
    assert_eq!(episode.records.len(), 4);

    let exporter = DatasetExporter::open(dir.path().join("dataset")).unwrap();
    let report = exporter.export_episode(&episode.session_id, &episode.records, &frames);
    assert_eq!(report.total, 4);
    assert_eq!(report.exported, 1);
    assert_eq!(report.skipped_missing, 3);
    assert!(report.exported < episode.records.len());
}

#[test]
fn player_never_leaves_playfield_under_constant_input() {
    let mut session = running();
    for action in [Action::Left, Action::Right] {
        for _ in 0..200 {
            tick(
                &mut session,
                &TickInput {
                    action: Some(action),
                },
                &DecisionPolicy::default(),
                &quiet_config(),
            )
            .unwrap();
        }
    }
    assert_eq!(session.player.pos.x, WIDTH - session.player.size);
    assert_eq!(session.player.pos.y, HEIGHT - session.player.size);
}
