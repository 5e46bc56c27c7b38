use std::fmt::Debug;
use std::fmt::Error;
use std::fmt::Formatter;
use std::ops::Deref;
use std::time::Duration;
use std::time::Instant;

/// Wall-clock timer for progress logging; also doubles as the per-worker
/// liveness clock on the master (replaced on every heartbeat).
#[derive(Clone, Copy, Debug)]
pub struct SwTimer {
    instant: Instant,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwDuration {
    duration: Duration,
}

impl SwTimer {
    pub fn now() -> Self {
        Self { instant: Instant::now() }
    }

    pub fn elapsed(&self) -> SwDuration {
        SwDuration { duration: self.instant.elapsed() }
    }
}

impl SwDuration {
    pub fn to_seconds_string(&self) -> String {
        format!("{}.{:06} s", self.duration.as_secs(), self.duration.subsec_micros())
    }
}

impl Debug for SwDuration {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        write!(f, "{:?}", self.duration)
    }
}

impl Deref for SwDuration {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.duration
    }
}

#[cfg(test)]
mod tests {
    use crate::util::timer::SwDuration;
    use std::time::Duration;

    #[test]
    fn string_format() {
        let inputs = vec![
            (0, 7_106_780, "0.007106 s"),
            (152, 628_093_000, "152.628093 s"),
        ];
        for (sec, nano, sec_str) in inputs {
            let duration = SwDuration { duration: Duration::new(sec, nano) };
            assert_eq!(duration.to_seconds_string(), sec_str);
        }
    }
}
