use shared::{speed_of, step_length, ErrorReason, FootballPlayer, PlayerAction, Vector};

/// Relative slack allowed above a limit before input counts as a violation.
const LIMIT_TOLERANCE: f32 = 1.0001;

/// An action after validation, with the violations found while clamping it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAction {
    pub action: PlayerAction,
    pub violations: Vec<ErrorReason>,
}

/// Checks a submitted action against the physical limits of the player.
///
/// `player.movement` must still hold the movement of the previous step; it is
/// the base for the acceleration check. Offending components are clamped or
/// zeroed, never rejected as a whole.
pub fn validate_action(
    player: &FootballPlayer,
    action: &PlayerAction,
    step_ms: f32,
) -> ValidatedAction {
    let mut violations = Vec::new();
    let movement = validate_movement(player, action.movement, step_ms, &mut violations);
    let kick = validate_kick(player, action.kick, step_ms, &mut violations);

    ValidatedAction {
        action: PlayerAction { movement, kick },
        violations,
    }
}

fn validate_movement(
    player: &FootballPlayer,
    movement: Vector,
    step_ms: f32,
    violations: &mut Vec<ErrorReason>,
) -> Vector {
    if !movement.is_finite() {
        violations.push(ErrorReason::InvalidMovementVector);
        return Vector::ZERO;
    }

    let max_speed = player.max_speed();
    let speed = speed_of(&movement, step_ms);
    // Only gaining speed is limited; players may stop or turn freely.
    let previous_speed = player.current_speed(step_ms);
    let max_gain = player.max_acceleration() * step_ms / 1000.0;
    let allowed = (previous_speed + max_gain).min(max_speed);

    // Over-speed input is still held to the acceleration cap, but reported once.
    if speed > max_speed * LIMIT_TOLERANCE {
        violations.push(ErrorReason::TooHighSpeed);
        return movement.with_length(step_length(allowed, step_ms));
    }

    if speed - previous_speed > max_gain * LIMIT_TOLERANCE {
        violations.push(ErrorReason::TooHighAcceleration);
        return movement.with_length(step_length(allowed, step_ms));
    }

    movement
}

fn validate_kick(
    player: &FootballPlayer,
    kick: Vector,
    step_ms: f32,
    violations: &mut Vec<ErrorReason>,
) -> Vector {
    if !kick.is_finite() {
        violations.push(ErrorReason::InvalidKickVector);
        return Vector::ZERO;
    }

    let max_kick_speed = player.max_kick_speed();
    if speed_of(&kick, step_ms) > max_kick_speed * LIMIT_TOLERANCE {
        violations.push(ErrorReason::TooStrongKick);
        return kick.with_length(step_length(max_kick_speed, step_ms));
    }

    kick
}

/// Advances the ball's speed loss over one step and returns the new movement.
pub fn decelerate(movement: Vector, deceleration: f32, step_ms: f32) -> Vector {
    let speed = speed_of(&movement, step_ms);
    let slower = (speed - deceleration * step_ms / 1000.0).max(0.0);
    if slower == 0.0 {
        Vector::ZERO
    } else {
        movement.with_length(step_length(slower, step_ms))
    }
}

/// Distance the ball travels from the given speed until it stops.
pub fn stopping_distance(speed: f32, deceleration: f32) -> f32 {
    if deceleration <= 0.0 {
        f32::INFINITY
    } else {
        speed * speed / (2.0 * deceleration)
    }
}
