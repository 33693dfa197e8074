use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use crate::material::Material;
use crate::scene::Scene;

type Task = Box<dyn FnOnce() + Send>;

/// Cooperative queue drained one task per [`AsyncTaskQueue::step`], typically once per frame.
#[derive(Default)]
pub struct AsyncTaskQueue {
    tasks: VecDeque<Task>,
    running: bool,
}

impl AsyncTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, task: impl FnOnce() + Send + 'static) {
        self.tasks.push_back(Box::new(task));
    }

    pub fn execute(&mut self) {
        self.running = !self.tasks.is_empty();
    }

    /// Runs the next task. Returns `false` once nothing is left to run.
    pub fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        match self.tasks.pop_front() {
            Some(task) => {
                task();
                self.running = !self.tasks.is_empty();
                true
            }
            None => {
                self.running = false;
                false
            }
        }
    }

    /// Drops every pending task.
    pub fn cancel(&mut self) {
        if !self.tasks.is_empty() {
            log::debug!("Cancelling {} pending tasks", self.tasks.len());
        }
        self.tasks.clear();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Assigns every light in the scene to every material in the scene.
///
/// Materials seen for the first time get their list immediately. Materials already in use are
/// updated through the queue, one per frame, so no material changes while a frame draws it. A
/// change in the light set cancels pending updates and restarts the assignment.
#[derive(Default)]
pub struct FixedLightsSystem {
    lights: Vec<hecs::Entity>,
    seen: Vec<Weak<Material>>,
    queue: AsyncTaskQueue,
}

impl FixedLightsSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lights(&self) -> &[hecs::Entity] {
        &self.lights
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Picks up added or removed lights and newly added materials.
    pub fn sync(&mut self, scene: &Scene) {
        self.seen.retain(|material| material.strong_count() > 0);

        let lights = scene.light_entities();
        let materials = scene.materials();

        if lights != self.lights {
            log::debug!("Light set changed ({} lights), reassigning", lights.len());
            self.lights = lights;
            self.queue.cancel();
            for material in materials {
                self.queue_or_assign(material);
            }
        } else {
            for material in materials {
                if !self.has_seen(&material) {
                    self.queue_or_assign(material);
                }
            }
        }

        if !self.queue.is_running() {
            self.queue.execute();
        }
    }

    pub fn step(&mut self) -> bool {
        self.queue.step()
    }

    fn has_seen(&self, material: &Arc<Material>) -> bool {
        self.seen
            .iter()
            .any(|seen| std::ptr::eq(seen.as_ptr(), Arc::as_ptr(material)))
    }

    fn queue_or_assign(&mut self, material: Arc<Material>) {
        let lights = self.lights.clone();
        if !self.has_seen(&material) {
            self.seen.push(Arc::downgrade(&material));
        }
        if material.fixed_lights().is_none() {
            material.set_fixed_lights(Some(lights));
        } else {
            self.queue
                .queue(move || material.set_fixed_lights(Some(lights)));
        }
    }
}
