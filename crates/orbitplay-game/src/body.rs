//! Bodies and the free functions that move them.
//!
//! Every entity is a [`Body`]; what it is lives in its [`BodyKind`] tag.
//! Bodies sit in one arena `Vec` and are addressed by index. Functions here
//! take the whole slice so pairwise passes need no shared references.

use orbitplay_netplay::PlayerId;
use serde::{Deserialize, Serialize};

use crate::fixed::{ONE, SHIFT, Vec2, from_int, isqrt};

/// Gravitational constant, in fixed units per frame squared per unit of area
/// at one world unit of distance.
pub const GRAVITY: i64 = 64;
/// Area of the black hole pinned at the origin.
pub const CENTER_AREA: i64 = 20_000;
/// Anything closer to the origin than this is swallowed.
pub const EVENT_HORIZON: i64 = from_int(12);
/// Half the side of the square arena.
pub const ARENA_HALF: i64 = from_int(400);
/// Distances below this (in world units, squared) do not increase the pull.
const MIN_DISTANCE_SQ: i64 = 64;
/// Ships at or below this radius cannot eject any more mass.
pub const MIN_FIRE_RADIUS: i64 = from_int(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Ship { owner: PlayerId },
    Ejecta,
    Asteroid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub kind: BodyKind,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Square world units.
    pub area: i64,
    pub alive: bool,
}

impl Body {
    pub fn new(kind: BodyKind, pos: Vec2, vel: Vec2, area: i64) -> Self {
        Self {
            kind,
            pos,
            vel,
            area,
            alive: true,
        }
    }

    /// Fixed-point radius of a disc with this area.
    pub fn radius(&self) -> i64 {
        radius_for_area(self.area)
    }

    pub fn owner(&self) -> Option<PlayerId> {
        match self.kind {
            BodyKind::Ship { owner } => Some(owner),
            _ => None,
        }
    }
}

/// `sqrt(area / pi)` in fixed point, with pi as 314/100.
pub fn radius_for_area(area: i64) -> i64 {
    isqrt(area.max(0).saturating_mul(ONE * ONE) * 100 / 314)
}

/// Acceleration a mass of `area` at offset `delta` exerts, in fixed units.
fn pull(delta: Vec2, area: i64) -> Vec2 {
    let dist_sq = (delta.length_sq() >> (2 * SHIFT)).max(MIN_DISTANCE_SQ);
    delta.with_length(GRAVITY * area / dist_sq)
}

/// Speed of a circular orbit around the center at distance `r` (fixed).
pub fn orbital_speed(r: i64) -> i64 {
    let r_units_sq = ((r >> SHIFT) * (r >> SHIFT)).max(MIN_DISTANCE_SQ);
    isqrt(GRAVITY * CENTER_AREA / r_units_sq * r)
}

/// Accumulate the pull of the center and of every other body into velocities.
pub fn apply_gravity(bodies: &mut [Body]) {
    let deltas: Vec<Vec2> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            if !body.alive {
                return Vec2::ZERO;
            }
            let mut acc = pull(Vec2::ZERO.sub(body.pos), CENTER_AREA);
            for (j, other) in bodies.iter().enumerate() {
                if i != j && other.alive {
                    acc = acc.add(pull(other.pos.sub(body.pos), other.area));
                }
            }
            acc
        })
        .collect();

    for (body, acc) in bodies.iter_mut().zip(deltas) {
        body.vel = body.vel.add(acc);
    }
}

/// Move every live body by its velocity. Ships bounce off the arena walls;
/// anything else that leaves the arena is gone.
pub fn integrate(bodies: &mut [Body]) {
    for body in bodies.iter_mut().filter(|b| b.alive) {
        body.pos = body.pos.add(body.vel);

        let is_ship = body.owner().is_some();
        for (p, v) in [
            (&mut body.pos.x, &mut body.vel.x),
            (&mut body.pos.y, &mut body.vel.y),
        ] {
            if p.abs() > ARENA_HALF {
                if is_ship {
                    *p = (*p).clamp(-ARENA_HALF, ARENA_HALF);
                    *v = -*v;
                } else {
                    body.alive = false;
                }
            }
        }
    }
}

/// Ship at `index` throws a tenth of its mass toward `dir`, recoiling the
/// other way. Returns the ejected body, or `None` when the ship is too small.
pub fn eject(bodies: &mut [Body], index: usize, dir: (i16, i16)) -> Option<Body> {
    let ship = bodies.get_mut(index)?;
    let dir = Vec2::new(dir.0 as i64, dir.1 as i64);
    if !ship.alive || ship.radius() <= MIN_FIRE_RADIUS || dir == Vec2::ZERO {
        return None;
    }

    let shot_area = ship.area / 10;
    let shot_speed = isqrt(shot_area) * ONE / 4;
    let shot_vel = dir.with_length(shot_speed);
    let offset = dir.with_length(ship.radius() * 2);

    ship.area -= shot_area;
    let recoil = shot_vel.with_length(shot_speed * shot_area / ship.area.max(1));
    ship.vel = ship.vel.sub(recoil);

    Some(Body::new(
        BodyKind::Ejecta,
        ship.pos.add(offset),
        ship.vel.add(shot_vel),
        shot_area,
    ))
}

/// Overlapping bodies merge: the larger one takes the area and momentum of
/// the smaller. Ties go to the lower index.
pub fn absorb(bodies: &mut [Body]) {
    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let (a, b) = (bodies[i], bodies[j]);
            if !a.alive || !b.alive {
                continue;
            }
            let reach = a.radius() + b.radius();
            if b.pos.sub(a.pos).length_sq() >= reach.saturating_mul(reach) {
                continue;
            }

            let (big, small) = if a.area >= b.area { (i, j) } else { (j, i) };
            let (big_body, small_body) = (bodies[big], bodies[small]);
            let total = (big_body.area + small_body.area).max(1);
            let momentum = |bv: i64, sv: i64| {
                (bv * big_body.area + sv * small_body.area) / total
            };
            bodies[big].vel = Vec2::new(
                momentum(big_body.vel.x, small_body.vel.x),
                momentum(big_body.vel.y, small_body.vel.y),
            );
            bodies[big].area = total;
            bodies[small].alive = false;
        }
    }
}

/// Mark everything inside the event horizon as swallowed.
pub fn swallow(bodies: &mut [Body]) {
    for body in bodies.iter_mut().filter(|b| b.alive) {
        if body.pos.length_sq() < EVENT_HORIZON * EVENT_HORIZON {
            body.alive = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ship(x: i64, area: i64) -> Body {
        Body::new(
            BodyKind::Ship { owner: 0 },
            Vec2::new(from_int(x), 0),
            Vec2::ZERO,
            area,
        )
    }

    #[test]
    fn gravity_pulls_toward_the_center() {
        let mut bodies = vec![ship(200, 1000), ship(-200, 1000)];
        apply_gravity(&mut bodies);
        assert!(bodies[0].vel.x < 0);
        assert!(bodies[1].vel.x > 0);
        assert_eq!(bodies[0].vel.x, -bodies[1].vel.x);
    }

    #[test]
    fn ships_bounce_off_the_walls() {
        let mut bodies = vec![Body::new(
            BodyKind::Ship { owner: 1 },
            Vec2::new(ARENA_HALF - ONE, -ARENA_HALF + ONE),
            Vec2::new(from_int(3), -from_int(2)),
            1000,
        )];
        integrate(&mut bodies);

        let ship = bodies[0];
        assert!(ship.alive);
        assert_eq!(ship.pos, Vec2::new(ARENA_HALF, -ARENA_HALF));
        assert_eq!(ship.vel, Vec2::new(-from_int(3), from_int(2)));
    }

    #[test]
    fn strays_leave_the_arena() {
        let mut bodies = vec![Body::new(
            BodyKind::Asteroid,
            Vec2::new(0, ARENA_HALF),
            Vec2::new(0, ONE),
            200,
        )];
        integrate(&mut bodies);
        assert!(!bodies[0].alive);
    }

    #[test]
    fn eject_conserves_area_and_recoils() {
        let mut bodies = vec![ship(100, 2000)];
        let shot = eject(&mut bodies, 0, (1, 0)).unwrap();
        assert_eq!(shot.area + bodies[0].area, 2000);
        assert!(shot.vel.x > 0);
        assert!(bodies[0].vel.x < 0);
        assert!(shot.pos.x > bodies[0].pos.x);
    }

    #[test]
    fn tiny_ships_cannot_fire() {
        let mut bodies = vec![ship(100, 100)];
        assert!(eject(&mut bodies, 0, (1, 0)).is_none());
        assert!(eject(&mut bodies, 5, (1, 0)).is_none());
    }

    #[test]
    fn bigger_body_absorbs_smaller() {
        let mut bodies = vec![ship(100, 500), ship(105, 2000)];
        bodies[0].vel = Vec2::new(ONE * 5, 0);
        absorb(&mut bodies);
        assert!(!bodies[0].alive);
        assert_eq!(bodies[1].area, 2500);
        assert_eq!(bodies[1].vel.x, ONE * 5 * 500 / 2500);
    }

    #[test]
    fn rocks_leaving_the_arena_are_lost_ships_bounce() {
        let mut rock = ship(399, 100);
        rock.kind = BodyKind::Asteroid;
        rock.vel = Vec2::new(from_int(5), 0);
        let mut wall_ship = ship(399, 100);
        wall_ship.vel = Vec2::new(from_int(5), 0);

        let mut bodies = vec![rock, wall_ship];
        integrate(&mut bodies);
        assert!(!bodies[0].alive);
        assert!(bodies[1].alive);
        assert_eq!(bodies[1].pos.x, ARENA_HALF);
        assert!(bodies[1].vel.x < 0);
    }

    #[test]
    fn center_swallows() {
        let mut bodies = vec![ship(5, 100), ship(50, 100)];
        swallow(&mut bodies);
        assert!(!bodies[0].alive);
        assert!(bodies[1].alive);
    }
}
