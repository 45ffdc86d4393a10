use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 播放时钟 - 流水线阶段共享的时间线（阶段只读取，不拥有）
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockState>>,
}

struct ClockState {
    base_pts: i64,          // 基准 PTS（毫秒）
    base_instant: Instant,  // 基准时刻
    speed: f64,             // 播放速率（1.0 = 正常）
    paused: bool,
    paused_at: i64,         // 暂停时的位置
}

impl ClockState {
    fn now(&self) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            let elapsed = self.base_instant.elapsed().as_secs_f64() * 1000.0;
            self.base_pts + (elapsed * self.speed) as i64
        }
    }

    fn rebase(&mut self) {
        self.base_pts = self.now();
        self.base_instant = Instant::now();
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                base_pts: 0,
                base_instant: Instant::now(),
                speed: 1.0,
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 当前播放时间（毫秒）
    pub fn now_ms(&self) -> i64 {
        self.inner.lock().now()
    }

    pub fn set_time(&self, pts: i64) {
        let mut state = self.inner.lock();
        state.base_pts = pts;
        state.base_instant = Instant::now();
        state.paused_at = pts;
    }

    pub fn play(&self) {
        let mut state = self.inner.lock();
        if state.paused {
            state.base_pts = state.paused_at;
            state.base_instant = Instant::now();
            state.paused = false;
        }
    }

    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if !state.paused {
            state.paused_at = state.now();
            state.paused = true;
        }
    }

    /// 设置速率，运行中会先以当前位置为新基准，避免时间跳变
    pub fn set_speed(&self, speed: f64) {
        let mut state = self.inner.lock();
        if !state.paused {
            state.rebase();
        }
        state.speed = speed.max(0.0);
    }

    pub fn speed(&self) -> f64 {
        self.inner.lock().speed
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// 距离 pts 还需等待多久；已过期、暂停或速率为 0 时返回零
    pub fn delay_until(&self, pts: i64) -> Duration {
        let state = self.inner.lock();
        if state.paused || state.speed <= 0.0 {
            return Duration::ZERO;
        }
        let ahead = pts - state.now();
        if ahead <= 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(ahead as f64 / 1000.0 / state.speed)
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paused_clock_holds_position() {
        let clock = PlaybackClock::new();
        clock.set_time(1500);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.now_ms(), 1500);
        assert_eq!(clock.delay_until(5000), Duration::ZERO);
    }

    #[test]
    fn test_running_clock_advances() {
        let clock = PlaybackClock::new();
        clock.set_time(100);
        clock.play();
        std::thread::sleep(Duration::from_millis(20));
        assert!(clock.now_ms() >= 115);
        clock.pause();
        let frozen = clock.now_ms();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.now_ms(), frozen);
    }

    #[test]
    fn test_delay_until_future_pts() {
        let clock = PlaybackClock::new();
        clock.play();
        let delay = clock.delay_until(clock.now_ms() + 1000);
        assert!(delay > Duration::from_millis(900));
        assert!(delay <= Duration::from_millis(1000));
        assert_eq!(clock.delay_until(-10), Duration::ZERO);
    }
}
