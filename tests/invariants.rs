//! Properties that hold for every tick of every episode

use glam::Vec2;
use proptest::prelude::*;

use skyfall::consts::{HEIGHT, WIDTH};
use skyfall::sim::{
    Action, DecisionPolicy, Mode, Session, SpawnPolicy, TickConfig, TickInput, aabb_overlap, tick,
};

fn busy_config() -> TickConfig {
    TickConfig {
        spawn: SpawnPolicy {
            spawn_chance: 0.5,
            bonus_chance: 0.3,
        },
        ..Default::default()
    }
}

fn action_strategy() -> impl Strategy<Value = Option<Action>> {
    prop_oneof![
        Just(None),
        Just(Some(Action::Left)),
        Just(Some(Action::Right)),
        Just(Some(Action::Jump)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn human_episode_invariants(
        seed in any::<u64>(),
        actions in prop::collection::vec(action_strategy(), 1..400),
    ) {
        let mut session = Session::new("prop-human", seed);
        session.start(Mode::Human, "prop");
        let policy = DecisionPolicy::default();
        let config = busy_config();
        let mut last_score = 0;

        for action in actions {
            let input = TickInput { action };
            let Some(report) = tick(&mut session, &input, &policy, &config).unwrap() else {
                break;
            };
            let p = &session.player;
            prop_assert!(p.pos.x >= 0.0 && p.pos.x <= WIDTH - p.size);
            prop_assert!(p.pos.y >= 0.0 && p.pos.y <= HEIGHT - p.size);
            prop_assert!(session.score >= last_score);
            last_score = session.score;
            prop_assert!(session.obstacles.iter().all(|o| o.pos.y < HEIGHT));
            prop_assert_eq!(session.recorder.len() as u64, session.tick_count);
            if report.terminal {
                prop_assert!(session.recorder.is_sealed());
            }
        }
    }

    #[test]
    fn autonomous_episode_stays_in_bounds(seed in any::<u64>(), ticks in 1usize..600) {
        let mut session = Session::new("prop-ai", seed);
        session.start(Mode::Autonomous, "bot");
        let policy = DecisionPolicy::default();
        let config = busy_config();

        for _ in 0..ticks {
            if tick(&mut session, &TickInput::default(), &policy, &config).unwrap().is_none() {
                break;
            }
            let p = &session.player;
            prop_assert!(p.pos.x >= 0.0 && p.pos.x <= WIDTH - p.size);
            prop_assert!(p.pos.y >= 0.0 && p.pos.y <= HEIGHT - p.size);
        }
    }

    #[test]
    fn overlap_is_symmetric(
        ax in -100.0f32..1000.0, ay in -100.0f32..800.0, a_size in 1.0f32..100.0,
        bx in -100.0f32..1000.0, by in -100.0f32..800.0, b_size in 1.0f32..100.0,
    ) {
        let a = Vec2::new(ax, ay);
        let b = Vec2::new(bx, by);
        prop_assert_eq!(aabb_overlap(a, a_size, b, b_size), aabb_overlap(b, b_size, a, a_size));
    }
}
