use std::collections::BTreeMap;
use std::time::Duration;

use orbitplay_netplay::{
    CodecError, Frame, NetGame, NetplayPlayer, NetplayState, PlayerId, PlayerInputs,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    body::{self, ARENA_HALF, Body, BodyKind},
    canvas::AsciiCanvas,
    fixed::{Vec2, from_int},
    input::ClickInput,
    rng::XorShift,
};

pub const SHIP_AREA: i64 = 2_000;
/// Distance from the center ships start at.
pub const SPAWN_RADIUS: i64 = from_int(150);
/// An asteroid drifts in every this many frames.
pub const ASTEROID_PERIOD: Frame = 90;
pub const MAX_BODIES: usize = 64;

/// Gravity well: every player is a small black hole orbiting a big one.
///
/// Clicking throws a tenth of your mass toward the click and pushes you the
/// other way. Bigger bodies eat smaller ones. A ship that gets eaten or falls
/// into the center respawns and its owner takes a loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GravityWell {
    bodies: Vec<Body>,
    rng: XorShift,
    losses: BTreeMap<PlayerId, u32>,
    ticks: u64,
}

impl GravityWell {
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn losses(&self, player: PlayerId) -> u32 {
        self.losses.get(&player).copied().unwrap_or(0)
    }

    pub fn ship(&self, player: PlayerId) -> Option<&Body> {
        self.bodies.iter().find(|b| b.owner() == Some(player))
    }

    fn ship_index(&self, player: PlayerId) -> Option<usize> {
        self.bodies.iter().position(|b| b.owner() == Some(player))
    }

    fn spawn_ship(slot: usize, owner: PlayerId) -> Body {
        // Alternate sides so two players start opposite each other.
        let sign = if slot % 2 == 0 { -1 } else { 1 };
        let r = SPAWN_RADIUS + from_int(20) * (slot as i64 / 2);
        let speed = body::orbital_speed(r);
        Body::new(
            BodyKind::Ship { owner },
            Vec2::new(sign * r, 0),
            Vec2::new(0, sign * speed),
            SHIP_AREA,
        )
    }

    fn spawn_asteroid(&mut self) {
        if self.bodies.len() >= MAX_BODIES {
            return;
        }
        let edge = self.rng.range(-ARENA_HALF, ARENA_HALF);
        let pos = match self.rng.below(4) {
            0 => Vec2::new(edge, -ARENA_HALF),
            1 => Vec2::new(edge, ARENA_HALF),
            2 => Vec2::new(-ARENA_HALF, edge),
            _ => Vec2::new(ARENA_HALF, edge),
        };
        let aim = Vec2::new(
            self.rng.range(-from_int(100), from_int(100)),
            self.rng.range(-from_int(100), from_int(100)),
        );
        let speed = self.rng.range(from_int(1), from_int(3));
        let area = self.rng.range(100, 600);
        self.bodies.push(Body::new(
            BodyKind::Asteroid,
            pos,
            aim.sub(pos).with_length(speed),
            area,
        ));
    }

    /// Respawn dead ships, count the loss and drop everything else that died.
    fn settle(&mut self) {
        let mut slot = 0;
        for body in self.bodies.iter_mut() {
            let Some(owner) = body.owner() else {
                continue;
            };
            if !body.alive {
                *self.losses.entry(owner).or_default() += 1;
                debug!(player = owner, "ship lost");
                *body = Self::spawn_ship(slot, owner);
            }
            slot += 1;
        }
        self.bodies.retain(|b| b.alive);
    }
}

impl NetplayState for GravityWell {
    type Input = ClickInput;

    fn tick(&mut self, inputs: &PlayerInputs<ClickInput>, frame: Frame) {
        for (&player, input) in inputs {
            let Some(dir) = input.direction else {
                continue;
            };
            let Some(index) = self.ship_index(player) else {
                continue;
            };
            if let Some(shot) = body::eject(&mut self.bodies, index, dir)
                && self.bodies.len() < MAX_BODIES
            {
                self.bodies.push(shot);
            }
        }

        body::apply_gravity(&mut self.bodies);
        body::integrate(&mut self.bodies);
        body::absorb(&mut self.bodies);
        body::swallow(&mut self.bodies);
        self.settle();

        if frame % ASTEROID_PERIOD == ASTEROID_PERIOD - 1 {
            self.spawn_asteroid();
        }
        self.ticks += 1;
    }

    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        *self = postcard::from_bytes(bytes)?;
        Ok(())
    }
}

impl NetGame for GravityWell {
    const TIMESTEP: Duration = Duration::from_micros(16_667);

    type Canvas = AsciiCanvas;

    fn create(players: &[NetplayPlayer], seed: u64) -> Self {
        let mut ids: Vec<PlayerId> = players.iter().map(NetplayPlayer::id).collect();
        ids.sort_unstable();
        ids.dedup();

        Self {
            bodies: ids
                .iter()
                .enumerate()
                .map(|(slot, &id)| Self::spawn_ship(slot, id))
                .collect(),
            rng: XorShift::new(seed),
            losses: ids.iter().map(|&id| (id, 0)).collect(),
            ticks: 0,
        }
    }

    fn draw(&self, canvas: &mut AsciiCanvas, frame: Frame) {
        canvas.clear();
        canvas.plot(Vec2::ZERO, 'O');
        for body in &self.bodies {
            let glyph = match body.kind {
                BodyKind::Ship { owner } => char::from_digit(owner % 10, 10).unwrap_or('?'),
                BodyKind::Ejecta => '.',
                BodyKind::Asteroid => '*',
            };
            canvas.plot(body.pos, glyph);
        }

        let mut status = format!("frame {frame}");
        for (player, losses) in &self.losses {
            let area = self.ship(*player).map_or(0, |s| s.area);
            status.push_str(&format!("  P{player} area {area} lost {losses}"));
        }
        canvas.set_status(status);
    }
}

#[cfg(test)]
mod tests {
    use orbitplay_netplay::player::two_player_roster;

    use super::*;

    fn inputs(a: ClickInput, b: ClickInput) -> PlayerInputs<ClickInput> {
        [(0, a), (1, b)].into_iter().collect()
    }

    #[test]
    fn both_rosters_create_the_same_world() {
        let host = GravityWell::create(&two_player_roster(true), 42);
        let client = GravityWell::create(&two_player_roster(false), 42);
        assert_eq!(host, client);
        assert_eq!(host.bodies().len(), 2);
        assert_ne!(host, GravityWell::create(&two_player_roster(true), 43));
    }

    #[test]
    fn clicking_ejects_mass() {
        let mut game = GravityWell::create(&two_player_roster(true), 1);
        game.tick(&inputs(ClickInput::toward(0, 100), ClickInput::IDLE), 0);

        assert_eq!(game.bodies().len(), 3);
        assert!(game.ship(0).unwrap().area < SHIP_AREA);
        assert_eq!(game.ship(1).unwrap().area, SHIP_AREA);
    }

    #[test]
    fn asteroids_arrive_on_schedule() {
        let mut game = GravityWell::create(&two_player_roster(true), 9);
        for frame in 0..ASTEROID_PERIOD {
            game.tick(&inputs(ClickInput::IDLE, ClickInput::IDLE), frame);
        }
        assert!(
            game.bodies()
                .iter()
                .any(|b| b.kind == BodyKind::Asteroid)
        );
    }

    #[test]
    fn serialize_restores_exactly() {
        let mut game = GravityWell::create(&two_player_roster(true), 5);
        for frame in 0..200 {
            let click = if frame % 17 == 0 {
                ClickInput::toward(3, -4)
            } else {
                ClickInput::IDLE
            };
            game.tick(&inputs(click, ClickInput::IDLE), frame);
        }

        let bytes = NetplayState::serialize(&game).unwrap();
        let mut restored = GravityWell::create(&two_player_roster(false), 0);
        restored.deserialize(&bytes).unwrap();
        assert_eq!(restored, game);

        for frame in 200..260 {
            let i = inputs(ClickInput::toward(1, 1), ClickInput::IDLE);
            game.tick(&i, frame);
            restored.tick(&i, frame);
        }
        assert_eq!(restored, game);
    }

    #[test]
    fn constant_clicking_stays_in_bounds() {
        for seed in 0..8 {
            let mut game = GravityWell::create(&two_player_roster(true), seed);
            for frame in 0..3_000 {
                let a = ClickInput::toward((frame % 7) as i16 - 3, 5);
                let b = ClickInput::toward(-4, (frame % 5) as i16 - 2);
                game.tick(&inputs(a, b), frame);
            }
            for body in game.bodies() {
                assert!(body.pos.x.abs() <= ARENA_HALF);
                assert!(body.pos.y.abs() <= ARENA_HALF);
            }
            assert!(game.ship(0).is_some() && game.ship(1).is_some());
        }
    }

    #[test]
    fn draw_marks_ships_and_center() {
        let game = GravityWell::create(&two_player_roster(true), 1);
        let mut canvas = AsciiCanvas::default();
        game.draw(&mut canvas, 7);
        let text = canvas.to_string();
        assert!(text.contains('O'));
        assert!(text.contains('0'));
        assert!(text.contains('1'));
        assert!(text.starts_with("frame 7"));
    }
}
