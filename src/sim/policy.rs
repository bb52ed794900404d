//! Decision policies
//!
//! A policy observes a read-only `SessionView` and returns one `Action` per
//! tick. The heuristic agent is an ordered list of rules where the first rule
//! that returns `Some` wins. A learned model can stand in for it behind the
//! same `DecisionPolicy::decide` call.

use std::fmt;
use std::sync::Arc;

use super::state::{Action, Obstacle, ObstacleKind, SessionView};
use crate::consts::*;
use crate::error::PolicyError;
use crate::jump_apex_height;

/// Tunables of the heuristic agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicParams {
    /// Extra horizontal slack beyond the half-sizes when looking for threats
    pub threat_margin: f32,
    /// Composite distance below which a hazard is a threat
    pub threat_distance: f32,
    /// Composite distance below which a grounded player jumps a threat
    pub jump_distance: f32,
    /// Weight of the vertical term in the threat metric
    pub threat_vertical_weight: f32,
    /// Composite distance below which a bonus is worth chasing
    pub opportunity_distance: f32,
    /// Weight of the vertical term in the opportunity metric
    pub opportunity_vertical_weight: f32,
    /// Height above the player beyond which a grounded player jumps for a bonus
    pub opportunity_jump_height: f32,
    /// Highest a bonus can be above the player and still be chased
    pub reach: f32,
    /// Horizontal displacement from the middle that triggers centering
    pub center_tolerance: f32,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            threat_margin: 50.0,
            threat_distance: 150.0,
            jump_distance: 80.0,
            threat_vertical_weight: 0.5,
            opportunity_distance: 200.0,
            opportunity_vertical_weight: 0.3,
            opportunity_jump_height: 50.0,
            reach: jump_apex_height() + PLAYER_SIZE,
            center_tolerance: 100.0,
        }
    }
}

/// One step of the priority ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    ThreatResponse,
    OpportunitySeeking,
    Centering,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::ThreatResponse => "threat_response",
            Rule::OpportunitySeeking => "opportunity_seeking",
            Rule::Centering => "centering",
        }
    }

    pub fn evaluate(&self, view: &SessionView<'_>, params: &HeuristicParams) -> Option<Action> {
        match self {
            Rule::ThreatResponse => threat_response(view, params),
            Rule::OpportunitySeeking => opportunity_seeking(view, params),
            Rule::Centering => centering(view, params),
        }
    }
}

fn nearest_by<'a, F>(obstacles: &'a [Obstacle], metric: F) -> Option<(&'a Obstacle, f32)>
where
    F: Fn(&Obstacle) -> Option<f32>,
{
    obstacles
        .iter()
        .filter_map(|o| metric(o).map(|d| (o, d)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn threat_response(view: &SessionView<'_>, params: &HeuristicParams) -> Option<Action> {
    let player = view.player;
    let p = player.center();

    let (hazard, distance) = nearest_by(view.obstacles, |o| {
        if o.kind != ObstacleKind::Hazard {
            return None;
        }
        let c = o.center();
        let dx = c.x - p.x;
        let dy = p.y - c.y;
        if dy <= 0.0 || dx.abs() >= (player.size + o.size) / 2.0 + params.threat_margin {
            return None;
        }
        let d = dx.abs() + params.threat_vertical_weight * dy;
        (d < params.threat_distance).then_some(d)
    })?;

    if distance < params.jump_distance && player.is_grounded() {
        return Some(Action::Jump);
    }

    // Always away from the hazard; against a wall the clamped move is a no-op
    let dx = hazard.center().x - p.x;
    Some(if dx > 0.0 {
        Action::Left
    } else if dx < 0.0 {
        Action::Right
    } else if p.x < WIDTH / 2.0 {
        Action::Right
    } else {
        Action::Left
    })
}

fn opportunity_seeking(view: &SessionView<'_>, params: &HeuristicParams) -> Option<Action> {
    let player = view.player;
    let p = player.center();

    let (bonus, _) = nearest_by(view.obstacles, |o| {
        if o.kind != ObstacleKind::Bonus {
            return None;
        }
        let c = o.center();
        let above = p.y - c.y;
        if above > params.reach {
            return None;
        }
        let d = (c.x - p.x).abs() + params.opportunity_vertical_weight * above.abs();
        (d < params.opportunity_distance).then_some(d)
    })?;

    let c = bonus.center();
    let dx = c.x - p.x;
    let above = p.y - c.y;

    if above > params.opportunity_jump_height && player.is_grounded() {
        return Some(Action::Jump);
    }
    if dx.abs() <= MOVE_STEP / 2.0 {
        return Some(Action::Stay);
    }
    Some(if dx > 0.0 { Action::Right } else { Action::Left })
}

fn centering(view: &SessionView<'_>, params: &HeuristicParams) -> Option<Action> {
    let offset = view.player.center().x - WIDTH / 2.0;
    if offset.abs() <= params.center_tolerance {
        return None;
    }
    Some(if offset > 0.0 { Action::Left } else { Action::Right })
}

/// Rule-based agent
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicPolicy {
    pub rules: Vec<Rule>,
    pub params: HeuristicParams,
}

impl Default for HeuristicPolicy {
    fn default() -> Self {
        Self {
            rules: vec![Rule::ThreatResponse, Rule::OpportunitySeeking, Rule::Centering],
            params: HeuristicParams::default(),
        }
    }
}

impl HeuristicPolicy {
    pub fn decide(&self, view: &SessionView<'_>) -> Action {
        for rule in &self.rules {
            if let Some(action) = rule.evaluate(view, &self.params) {
                log::trace!("{} -> {}", rule.name(), action.as_str());
                return action;
            }
        }
        Action::Stay
    }
}

/// Number of obstacles encoded into an observation
pub const OBSERVED_OBSTACLES: usize = RECORDED_OBSTACLES;
/// Features per observed obstacle: dx, dy, size, kind, present
pub const OBSTACLE_FEATURES: usize = 5;
/// Length of the observation vector
pub const OBSERVATION_LEN: usize = 3 + OBSERVED_OBSTACLES * OBSTACLE_FEATURES;

/// Normalized feature vector fed to model scorers
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub features: Vec<f32>,
}

impl Observation {
    /// Player x, y, vy then the first obstacles in spawn order, relative to
    /// the player; absent slots are zero-filled
    pub fn from_view(view: &SessionView<'_>) -> Self {
        let player = view.player;
        let p = player.center();
        let mut features = Vec::with_capacity(OBSERVATION_LEN);
        features.push(player.pos.x / WIDTH);
        features.push(player.pos.y / HEIGHT);
        features.push(player.vy / JUMP_VELOCITY.abs());

        for slot in 0..OBSERVED_OBSTACLES {
            match view.obstacles.get(slot) {
                Some(o) => {
                    let c = o.center();
                    features.push((c.x - p.x) / WIDTH);
                    features.push((c.y - p.y) / HEIGHT);
                    features.push(o.size / WIDTH);
                    features.push(match o.kind {
                        ObstacleKind::Hazard => -1.0,
                        ObstacleKind::Bonus => 1.0,
                    });
                    features.push(1.0);
                }
                None => features.extend([0.0; OBSTACLE_FEATURES]),
            }
        }
        Self { features }
    }
}

/// Backend that scores every action for one observation.
/// Scores are indexed by `Action::index`.
pub trait ActionScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, observation: &Observation) -> Result<Vec<f32>, PolicyError>;
}

/// Placeholder backend until a trained model is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableScorer;

impl ActionScorer for UnavailableScorer {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn score(&self, _observation: &Observation) -> Result<Vec<f32>, PolicyError> {
        Err(PolicyError::Unavailable)
    }
}

/// Forwards observations to an `ActionScorer` and picks the best action
#[derive(Clone)]
pub struct LearnedModelPolicy {
    scorer: Arc<dyn ActionScorer>,
}

impl fmt::Debug for LearnedModelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnedModelPolicy")
            .field("scorer", &self.scorer.name())
            .finish()
    }
}

impl LearnedModelPolicy {
    pub fn new(scorer: Arc<dyn ActionScorer>) -> Self {
        Self { scorer }
    }

    pub fn try_decide(&self, view: &SessionView<'_>) -> Result<Action, PolicyError> {
        let observation = Observation::from_view(view);
        let scores = self.scorer.score(&observation)?;
        if scores.len() != Action::ALL.len() {
            return Err(PolicyError::BadOutput {
                expected: Action::ALL.len(),
                got: scores.len(),
            });
        }
        let best = scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .ok_or_else(|| PolicyError::Backend("all scores non-finite".into()))?;
        Ok(Action::ALL[best])
    }
}

/// The policy consulted in autonomous mode
#[derive(Debug, Clone)]
pub enum DecisionPolicy {
    Heuristic(HeuristicPolicy),
    LearnedModel(LearnedModelPolicy),
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        DecisionPolicy::Heuristic(HeuristicPolicy::default())
    }
}

impl DecisionPolicy {
    pub fn learned(scorer: Arc<dyn ActionScorer>) -> Self {
        DecisionPolicy::LearnedModel(LearnedModelPolicy::new(scorer))
    }

    /// Action for this tick. Backend failures fall back to `Stay` for this
    /// tick only.
    pub fn decide(&self, view: &SessionView<'_>) -> Action {
        match self {
            DecisionPolicy::Heuristic(policy) => policy.decide(view),
            DecisionPolicy::LearnedModel(policy) => match policy.try_decide(view) {
                Ok(action) => action,
                Err(err) => {
                    log::warn!(
                        "Decision policy {} failed: {}; staying this tick",
                        policy.scorer.name(),
                        err
                    );
                    Action::Stay
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::Player;
    use glam::Vec2;

    struct FixedScorer(Vec<f32>);

    impl ActionScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _observation: &Observation) -> Result<Vec<f32>, PolicyError> {
            Ok(self.0.clone())
        }
    }

    fn grounded(x: f32) -> Player {
        Player::at(x, HEIGHT - PLAYER_SIZE)
    }

    fn decide(player: &Player, obstacles: &[Obstacle]) -> Action {
        let view = SessionView { player, obstacles };
        HeuristicPolicy::default().decide(&view)
    }

    #[test]
    fn test_jumps_hazard_directly_above() {
        let player = grounded(455.0);
        // Centers aligned, 70 px above -> composite 35
        let hazard = Obstacle::new(
            ObstacleKind::Hazard,
            Vec2::new(455.0, player.pos.y - 70.0),
        );
        assert_eq!(decide(&player, &[hazard]), Action::Jump);
    }

    #[test]
    fn test_moves_away_from_offset_threat() {
        let player = grounded(455.0);
        // 40 px right of the player, 200 px above -> composite 140
        let hazard = Obstacle::new(
            ObstacleKind::Hazard,
            Vec2::new(495.0, player.pos.y - 200.0),
        );
        assert_eq!(decide(&player, &[hazard]), Action::Left);
    }

    #[test]
    fn test_player_against_wall_never_moves_under_threat() {
        let player = grounded(0.0);
        // Hazard center 10 px right of a player against the left wall
        let hazard = Obstacle::new(ObstacleKind::Hazard, Vec2::new(10.0, player.pos.y - 220.0));
        let action = decide(&player, &[hazard.clone()]);
        assert_eq!(action, Action::Left);

        let mut moved = player.clone();
        crate::sim::tick::apply_action(&mut moved, action);
        let before = (hazard.center().x - player.center().x).abs();
        let after = (hazard.center().x - moved.center().x).abs();
        assert!(after >= before);
    }

    #[test]
    fn test_ignores_hazard_below_or_far() {
        let player = Player::at(455.0, 300.0);
        let below = Obstacle::new(ObstacleKind::Hazard, Vec2::new(455.0, 400.0));
        let wide = Obstacle::new(ObstacleKind::Hazard, Vec2::new(700.0, 250.0));
        assert_eq!(decide(&player, &[below, wide]), Action::Stay);
    }

    #[test]
    fn test_seeks_nearby_bonus() {
        let player = grounded(455.0);
        let bonus = Obstacle::new(ObstacleKind::Bonus, Vec2::new(560.0, player.pos.y));
        assert_eq!(decide(&player, &[bonus]), Action::Right);
    }

    #[test]
    fn test_jumps_for_bonus_overhead() {
        let player = grounded(455.0);
        let bonus = Obstacle::new(ObstacleKind::Bonus, Vec2::new(465.0, player.pos.y - 100.0));
        assert_eq!(decide(&player, &[bonus]), Action::Jump);
    }

    #[test]
    fn test_jumps_for_bonus_up_and_to_the_side() {
        let player = grounded(455.0);
        // Center 100 px right and 100 px above -> composite 130
        let bonus = Obstacle::new(ObstacleKind::Bonus, Vec2::new(565.0, player.pos.y - 90.0));
        assert_eq!(decide(&player, &[bonus]), Action::Jump);
    }

    #[test]
    fn test_threat_beats_opportunity() {
        let player = grounded(455.0);
        let bonus = Obstacle::new(ObstacleKind::Bonus, Vec2::new(560.0, player.pos.y));
        let hazard = Obstacle::new(ObstacleKind::Hazard, Vec2::new(455.0, player.pos.y - 70.0));
        assert_eq!(decide(&player, &[bonus, hazard]), Action::Jump);
    }

    #[test]
    fn test_centering() {
        assert_eq!(decide(&grounded(50.0), &[]), Action::Right);
        assert_eq!(decide(&grounded(850.0), &[]), Action::Left);
        assert_eq!(decide(&grounded(470.0), &[]), Action::Stay);
    }

    #[test]
    fn test_observation_shape() {
        let player = grounded(100.0);
        let obstacles = vec![Obstacle::new(ObstacleKind::Bonus, Vec2::new(0.0, 0.0))];
        let view = SessionView {
            player: &player,
            obstacles: &obstacles,
        };
        let obs = Observation::from_view(&view);
        assert_eq!(obs.features.len(), OBSERVATION_LEN);
        assert_eq!(obs.features[3 + 3], 1.0);
        assert_eq!(obs.features[3 + 4], 1.0);
        assert_eq!(obs.features[3 + OBSTACLE_FEATURES + 4], 0.0);
    }

    #[test]
    fn test_learned_model_argmax() {
        let policy = DecisionPolicy::learned(Arc::new(FixedScorer(vec![0.1, 0.2, 0.9, 0.3])));
        let player = grounded(100.0);
        let view = SessionView {
            player: &player,
            obstacles: &[],
        };
        assert_eq!(policy.decide(&view), Action::Right);
    }

    #[test]
    fn test_learned_model_failure_falls_back() {
        let player = grounded(100.0);
        let view = SessionView {
            player: &player,
            obstacles: &[],
        };
        let unavailable = DecisionPolicy::learned(Arc::new(UnavailableScorer));
        assert_eq!(unavailable.decide(&view), Action::Stay);

        let short = LearnedModelPolicy::new(Arc::new(FixedScorer(vec![1.0])));
        assert_eq!(
            short.try_decide(&view),
            Err(PolicyError::BadOutput { expected: 4, got: 1 })
        );
    }
}
