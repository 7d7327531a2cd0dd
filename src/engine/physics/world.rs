// ============================================
// Physics World - rapier3d для агрегатов
// ============================================
// Одно динамическое тело на агрегат, по кубовидному коллайдеру на куб.
// Масса куба 0.1 => масса тела = cube_count / 10.
// Оторванный куб - отдельное тело с одним коллайдером.

use rapier3d::prelude::*;
use ultraviolet::{Isometry3, Vec3};

use super::convert::{from_na_isometry, from_na_vec, to_na_isometry, to_na_vec};

/// Масса одного куба
pub const CUBE_MASS: f32 = 0.1;

/// Половина ребра куба
pub const CUBE_HALF_EXTENT: f32 = 0.5;

/// Гравитация по умолчанию
pub const GRAVITY: f32 = -9.81;

/// Обёртка над пайплайном rapier
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    /// Глобальная пауза (массовая загрузка)
    suspended: bool,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, GRAVITY, 0.0],
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            suspended: false,
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = to_na_vec(gravity);
    }

    /// Шаг симуляции (ничего не делает на паузе)
    pub fn step(&mut self, dt: f32) {
        if self.suspended || dt <= 0.0 {
            return;
        }

        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    pub fn suspend(&mut self) {
        if !self.suspended {
            log::debug!("[PHYSICS] Симуляция приостановлена");
        }
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        if self.suspended {
            log::debug!("[PHYSICS] Симуляция возобновлена");
        }
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    // ---------- Тела ----------

    /// Тело агрегата без коллайдеров
    pub fn create_aggregate_body(&mut self, transform: &Isometry3, enabled: bool) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .position(to_na_isometry(transform))
            .enabled(enabled)
            .build();
        self.bodies.insert(body)
    }

    /// Тело одиночного оторванного куба
    pub fn create_cube_body(&mut self, transform: &Isometry3) -> RigidBodyHandle {
        let handle = self.bodies.insert(RigidBodyBuilder::dynamic().position(to_na_isometry(transform)).build());
        let collider = ColliderBuilder::cuboid(CUBE_HALF_EXTENT, CUBE_HALF_EXTENT, CUBE_HALF_EXTENT)
            .mass(CUBE_MASS)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Неподвижное тело (точка крепления троса)
    pub fn create_fixed_body(&mut self, position: Vec3) -> RigidBodyHandle {
        self.bodies.insert(RigidBodyBuilder::fixed().translation(to_na_vec(position)).build())
    }

    /// Пересобрать коллайдеры тела по локальным позициям кубов
    pub fn rebuild_cube_colliders(&mut self, body: RigidBodyHandle, local_positions: &[Vec3]) {
        let existing: Vec<ColliderHandle> = match self.bodies.get(body) {
            Some(b) => b.colliders().to_vec(),
            None => return,
        };
        for collider in existing {
            self.colliders.remove(collider, &mut self.islands, &mut self.bodies, false);
        }

        for pos in local_positions {
            let collider = ColliderBuilder::cuboid(CUBE_HALF_EXTENT, CUBE_HALF_EXTENT, CUBE_HALF_EXTENT)
                .translation(to_na_vec(*pos))
                .mass(CUBE_MASS)
                .build();
            self.colliders.insert_with_parent(collider, body, &mut self.bodies);
        }
    }

    /// Удалить тело вместе с коллайдерами и суставами
    pub fn remove_body(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn set_body_enabled(&mut self, body: RigidBodyHandle, enabled: bool) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_enabled(enabled);
        }
    }

    pub fn is_body_enabled(&self, body: RigidBodyHandle) -> bool {
        self.bodies.get(body).map_or(false, |b| b.is_enabled())
    }

    pub fn body_pose(&self, body: RigidBodyHandle) -> Option<Isometry3> {
        self.bodies.get(body).map(|b| from_na_isometry(b.position()))
    }

    pub fn set_body_pose(&mut self, body: RigidBodyHandle, pose: &Isometry3) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_position(to_na_isometry(pose), true);
        }
    }

    /// (линейная, угловая) скорость
    pub fn body_velocity(&self, body: RigidBodyHandle) -> Option<(Vec3, Vec3)> {
        self.bodies.get(body).map(|b| (from_na_vec(b.linvel()), from_na_vec(b.angvel())))
    }

    pub fn set_body_velocity(&mut self, body: RigidBodyHandle, linear: Vec3, angular: Vec3) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.set_linvel(to_na_vec(linear), true);
            b.set_angvel(to_na_vec(angular), true);
        }
    }

    pub fn collider_count(&self, body: RigidBodyHandle) -> usize {
        self.bodies.get(body).map_or(0, |b| b.colliders().len())
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contains_body(&self, body: RigidBodyHandle) -> bool {
        self.bodies.contains(body)
    }

    // ---------- Суставы ----------

    /// Шаровой сустав между телами
    pub fn attach_joint(&mut self, body_a: RigidBodyHandle, anchor_a: Vec3, body_b: RigidBodyHandle, anchor_b: Vec3) -> ImpulseJointHandle {
        let joint = SphericalJointBuilder::new()
            .local_anchor1(point![anchor_a.x, anchor_a.y, anchor_a.z])
            .local_anchor2(point![anchor_b.x, anchor_b.y, anchor_b.z]);
        self.impulse_joints.insert(body_a, body_b, joint, true)
    }

    pub fn remove_joint(&mut self, joint: ImpulseJointHandle) {
        self.impulse_joints.remove(joint, true);
    }

    pub fn contains_joint(&self, joint: ImpulseJointHandle) -> bool {
        self.impulse_joints.get(joint).is_some()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultraviolet::Rotor3;

    #[test]
    fn colliders_follow_cube_positions() {
        let mut physics = PhysicsWorld::new();
        let body = physics.create_aggregate_body(&Isometry3::identity(), true);

        physics.rebuild_cube_colliders(body, &[Vec3::zero(), Vec3::unit_x(), Vec3::unit_y()]);
        assert_eq!(physics.collider_count(body), 3);

        physics.rebuild_cube_colliders(body, &[Vec3::zero()]);
        assert_eq!(physics.collider_count(body), 1);
    }

    #[test]
    fn suspended_world_does_not_move() {
        let mut physics = PhysicsWorld::new();
        let start = Isometry3::new(Vec3::new(0.0, 10.0, 0.0), Rotor3::identity());
        let cube = physics.create_cube_body(&start);

        physics.suspend();
        physics.step(1.0 / 60.0);
        assert_eq!(physics.body_pose(cube).unwrap().translation.y, 10.0);

        physics.resume();
        for _ in 0..10 {
            physics.step(1.0 / 60.0);
        }
        assert!(physics.body_pose(cube).unwrap().translation.y < 10.0);
    }

    #[test]
    fn removing_a_body_drops_its_joints() {
        let mut physics = PhysicsWorld::new();
        let cube = physics.create_cube_body(&Isometry3::identity());
        let anchor = physics.create_fixed_body(Vec3::new(0.0, 3.0, 0.0));
        let joint = physics.attach_joint(cube, Vec3::zero(), anchor, Vec3::zero());
        assert!(physics.contains_joint(joint));

        physics.remove_body(cube);
        assert!(!physics.contains_joint(joint));
        assert!(!physics.contains_body(cube));
    }
}
