use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

/// highest percent a work unit can report
pub const MAX_PERCENT: u8 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame percent {0} is outside of 0..=100")]
    PercentOutOfRange(u32),
    #[error("Frame for percent {0} was already recorded for this unit")]
    DuplicateFrame(u8),
}

/// A single checkpoint ("frame") reported by a client for its current work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct UnitFrame {
    percent: u8,
    time_of_frame: Duration,
    frame_duration: Option<Duration>,
}

// unchecked wire form of `UnitFrame`
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFrame {
    percent: u32,
    time_of_frame: Duration,
    #[serde(default)]
    frame_duration: Option<Duration>,
}

impl TryFrom<RawFrame> for UnitFrame {
    type Error = FrameError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        let mut frame = UnitFrame::new(raw.percent, raw.time_of_frame)?;
        frame.frame_duration = raw.frame_duration;

        Ok(frame)
    }
}

impl UnitFrame {
    pub fn new(percent: u32, time_of_frame: Duration) -> Result<Self, FrameError> {
        match u8::try_from(percent) {
            Ok(percent) if percent <= MAX_PERCENT => Ok(Self {
                percent,
                time_of_frame,
                frame_duration: None,
            }),
            _ => Err(FrameError::PercentOutOfRange(percent)),
        }
    }

    /// builder style variant of `set_frame_duration`
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.frame_duration = Some(duration);
        self
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn time_of_frame(&self) -> Duration {
        self.time_of_frame
    }

    /// Time taken from the previous frame to this one, `None` until computable
    pub fn frame_duration(&self) -> Option<Duration> {
        self.frame_duration
    }

    pub fn set_frame_duration(&mut self, duration: Duration) {
        self.frame_duration = Some(duration);
    }
}

/// Progress of one work unit as reported by a monitored client.
///
/// This is the only view the benchmark store has on a unit, log parsing and
/// everything upstream of it lives with the caller.
pub trait UnitProgress: Send + Sync {
    fn owner_name(&self) -> &str;
    fn owner_path(&self) -> &str;
    fn project_id(&self) -> i32;
    /// frame recorded for `percent`, frames are sparse
    fn frame(&self, percent: u8) -> Option<&UnitFrame>;
}

/// Plain work unit with its frames indexed by percent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkUnit", into = "RawWorkUnit")]
pub struct WorkUnit {
    pub owner_name: String,
    pub owner_path: String,
    pub project_id: i32,
    frames: BTreeMap<u8, UnitFrame>,
}

// frames are written as a plain list, the percent index is rebuilt on load
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkUnit {
    owner_name: String,
    owner_path: String,
    project_id: i32,
    #[serde(default)]
    frames: Vec<UnitFrame>,
}

impl TryFrom<RawWorkUnit> for WorkUnit {
    type Error = FrameError;

    fn try_from(raw: RawWorkUnit) -> Result<Self, Self::Error> {
        let mut unit = WorkUnit::new(raw.owner_name, raw.owner_path, raw.project_id);
        raw.frames
            .into_iter()
            .try_for_each(|frame| unit.insert_frame(frame))?;

        Ok(unit)
    }
}

impl From<WorkUnit> for RawWorkUnit {
    fn from(unit: WorkUnit) -> Self {
        Self {
            owner_name: unit.owner_name,
            owner_path: unit.owner_path,
            project_id: unit.project_id,
            frames: unit.frames.into_values().collect(),
        }
    }
}

impl WorkUnit {
    pub fn new(owner_name: impl Into<String>, owner_path: impl Into<String>, project_id: i32) -> Self {
        Self {
            owner_name: owner_name.into(),
            owner_path: owner_path.into(),
            project_id,
            frames: BTreeMap::new(),
        }
    }

    /// add a frame, a percent can only be recorded once per unit
    pub fn insert_frame(&mut self, frame: UnitFrame) -> Result<(), FrameError> {
        if self.frames.contains_key(&frame.percent) {
            return Err(FrameError::DuplicateFrame(frame.percent));
        }

        self.frames.insert(frame.percent, frame);

        Ok(())
    }

    /// Fill in missing frame durations from the elapsed time between
    /// consecutive frames
    pub fn derive_frame_durations(&mut self) {
        let mut previous: Option<Duration> = None;

        for frame in self.frames.values_mut() {
            if let (None, Some(previous)) = (frame.frame_duration, previous) {
                frame.frame_duration = Some(frame.time_of_frame.saturating_sub(previous));
            }
            previous = Some(frame.time_of_frame);
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &UnitFrame> {
        self.frames.values()
    }
}

impl UnitProgress for WorkUnit {
    fn owner_name(&self) -> &str {
        &self.owner_name
    }

    fn owner_path(&self) -> &str {
        &self.owner_path
    }

    fn project_id(&self) -> i32 {
        self.project_id
    }

    fn frame(&self, percent: u8) -> Option<&UnitFrame> {
        self.frames.get(&percent)
    }
}
