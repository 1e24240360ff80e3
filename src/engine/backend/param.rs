//! Automation timeline for a single backend parameter.
//!
//! Mirrors the scheduling model of a browser audio graph: set-value events,
//! linear ramps that end at a given time, and exponential approach curves
//! (`SetTarget`) that run until the next event. `cancel_and_hold` freezes the
//! parameter at its current value and discards everything scheduled later.

/// Time constants after which an exponential approach is treated as settled.
const SETTLE_TIME_CONSTANTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Hold,
    Target { target: f32, time_constant: f64 },
}

impl Curve {
    fn eval(self, from_time: f64, from_value: f32, at: f64) -> f32 {
        match self {
            Curve::Hold => from_value,
            Curve::Target {
                target,
                time_constant,
            } => {
                if time_constant <= 0.0 || at <= from_time {
                    return if at <= from_time { from_value } else { target };
                }
                let decay = (-(at - from_time) / time_constant).exp() as f32;
                target + (from_value - target) * decay
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParamEvent {
    SetValue { time: f64, value: f32 },
    LinearRamp { end_time: f64, value: f32 },
    SetTarget {
        start: f64,
        target: f32,
        time_constant: f64,
    },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. } => time,
            ParamEvent::LinearRamp { end_time, .. } => end_time,
            ParamEvent::SetTarget { start, .. } => start,
        }
    }
}

/// One automatable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    anchor_time: f64,
    anchor_value: f32,
    anchor_curve: Curve,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self {
            anchor_time: 0.0,
            anchor_value: value,
            anchor_curve: Curve::Hold,
            events: Vec::new(),
        }
    }

    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent::SetValue { time, value });
    }

    pub fn linear_ramp_to(&mut self, value: f32, end_time: f64) {
        self.insert(ParamEvent::LinearRamp { end_time, value });
    }

    pub fn set_target_at(&mut self, target: f32, start: f64, time_constant: f64) {
        self.insert(ParamEvent::SetTarget {
            start,
            target,
            time_constant,
        });
    }

    /// Freeze the parameter at its value at `at`, dropping later events.
    pub fn cancel_and_hold(&mut self, at: f64) {
        let held = self.value_at(at);
        self.events.retain(|event| event.time() < at);
        self.events.push(ParamEvent::SetValue {
            time: at,
            value: held,
        });
    }

    /// Number of events still pending on the timeline.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: ParamEvent) {
        let time = event.time();
        let index = self.events.partition_point(|existing| existing.time() <= time);
        self.events.insert(index, event);
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut time = self.anchor_time;
        let mut value = self.anchor_value;
        let mut curve = self.anchor_curve;

        for event in &self.events {
            let at = event.time();
            if at > t {
                if let ParamEvent::LinearRamp {
                    end_time,
                    value: end_value,
                } = *event
                {
                    let start_value = curve.eval(time, value, time);
                    let span = end_time - time;
                    if span <= 0.0 {
                        return end_value;
                    }
                    let progress = ((t - time) / span).clamp(0.0, 1.0) as f32;
                    return start_value + (end_value - start_value) * progress;
                }
                break;
            }

            value = curve.eval(time, value, at);
            time = at;
            match *event {
                ParamEvent::SetValue { value: v, .. } | ParamEvent::LinearRamp { value: v, .. } => {
                    value = v;
                    curve = Curve::Hold;
                }
                ParamEvent::SetTarget {
                    target,
                    time_constant,
                    ..
                } => {
                    curve = Curve::Target {
                        target,
                        time_constant,
                    };
                }
            }
        }

        curve.eval(time, value, t)
    }

    /// Fold every event at or before `t` into the anchor.
    ///
    /// Keeps the per-sample evaluation short on the render path.
    pub fn prune(&mut self, t: f64) {
        let settled = self.events.partition_point(|event| event.time() <= t);
        if settled == 0 {
            self.settle_anchor(t);
            return;
        }

        // A ramp ending after `t` interpolates from the last settled event
        let mut time = self.anchor_time;
        let mut value = self.anchor_value;
        let mut curve = self.anchor_curve;
        for event in self.events.drain(..settled) {
            let at = event.time();
            value = curve.eval(time, value, at);
            time = at;
            match event {
                ParamEvent::SetValue { value: v, .. } | ParamEvent::LinearRamp { value: v, .. } => {
                    value = v;
                    curve = Curve::Hold;
                }
                ParamEvent::SetTarget {
                    target,
                    time_constant,
                    ..
                } => {
                    curve = Curve::Target {
                        target,
                        time_constant,
                    };
                }
            }
        }
        self.anchor_time = time;
        self.anchor_value = value;
        self.anchor_curve = curve;
        self.settle_anchor(t);
    }

    fn settle_anchor(&mut self, t: f64) {
        if let Curve::Target {
            target,
            time_constant,
        } = self.anchor_curve
        {
            if t - self.anchor_time > time_constant * SETTLE_TIME_CONSTANTS && self.events.is_empty()
            {
                self.anchor_time = t;
                self.anchor_value = target;
                self.anchor_curve = Curve::Hold;
            }
        }
    }
}
