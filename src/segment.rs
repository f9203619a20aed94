use crate::engine::EngineKind;
use crate::error::{Result, VideoError};

/// 一次渲染调用对应的片段，`index` 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub duration_secs: u32,
}

/// 按引擎的固定查表规则，把场景时长拆成若干片段时长
pub fn segment_durations(engine: EngineKind, duration: u32) -> Result<&'static [u32]> {
    let plan: &'static [u32] = match (engine, duration) {
        (EngineKind::Luma, 5) => &[5],
        (EngineKind::Luma, 9) => &[9],
        (EngineKind::Luma, 14) => &[5, 9],
        (EngineKind::Luma, 18) => &[9, 9],
        (EngineKind::Ltx, 5) => &[5],
        (EngineKind::Ltx, 10) => &[5, 5],
        _ => {
            return Err(VideoError::UnsupportedDuration {
                engine: engine.to_string(),
                duration,
            })
        }
    };
    Ok(plan)
}

pub fn plan_segments(engine: EngineKind, duration: u32) -> Result<Vec<Segment>> {
    Ok(segment_durations(engine, duration)?
        .iter()
        .enumerate()
        .map(|(i, &duration_secs)| Segment {
            index: i + 1,
            duration_secs,
        })
        .collect())
}
