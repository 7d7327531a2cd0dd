// ============================================
// Debounce - Отложенная пересборка визуала
// ============================================
// Каждый trigger() перезапускает таймер: серия быстрых
// добавлений схлопывается в одну пересборку

/// Таймер с перезапуском
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: f32,
    remaining: Option<f32>,
}

impl Debounce {
    pub fn new(delay: f32) -> Self {
        Self { delay, remaining: None }
    }

    /// Запросить срабатывание (перезапускает таймер)
    pub fn trigger(&mut self) {
        self.remaining = Some(self.delay);
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_pending(&self) -> bool {
        self.remaining.is_some()
    }

    /// Продвинуть таймер; true ровно один раз, когда время вышло
    pub fn tick(&mut self, dt: f32) -> bool {
        match self.remaining {
            Some(left) if left - dt <= 0.0 => {
                self.remaining = None;
                true
            }
            Some(left) => {
                self.remaining = Some(left - dt);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_delay() {
        let mut d = Debounce::new(0.25);
        d.trigger();
        assert!(!d.tick(0.125));
        assert!(d.tick(0.125));
        assert!(!d.tick(0.125));
    }

    #[test]
    fn retrigger_restarts_the_timer() {
        let mut d = Debounce::new(0.25);
        d.trigger();
        assert!(!d.tick(0.1875));
        d.trigger();
        assert!(!d.tick(0.1875));
        assert!(d.tick(0.0625));
    }

    #[test]
    fn idle_timer_never_fires() {
        let mut d = Debounce::new(0.1);
        assert!(!d.tick(1.0));
        d.trigger();
        d.cancel();
        assert!(!d.tick(1.0));
    }
}
