use crate::core::Frame;

/// 滤镜处理上下文 - 一次播放期间的临时状态，resetState 时丢弃
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    pub frames_processed: u64,
    pub last_pts: Option<i64>,
}

/// 滤镜接口，阶段独占滤镜对象并随阶段一起销毁
pub trait Filter: Send {
    fn name(&self) -> &str;

    fn describe(&self) -> String {
        self.name().to_string()
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn apply(&mut self, context: &mut FilterContext, frame: &mut Frame);
}

/// 按顺序执行已启用的滤镜
pub fn apply_chain(filters: &mut [Box<dyn Filter>], context: &mut FilterContext, frame: &mut Frame) {
    for filter in filters.iter_mut().filter(|f| f.is_enabled()) {
        filter.apply(context, frame);
    }
    context.frames_processed += 1;
    context.last_pts = Some(frame.pts);
}

/// 时间偏移滤镜：给每帧 pts 加上固定偏移（毫秒），用于音画同步微调
pub struct PtsOffsetFilter {
    offset_ms: i64,
}

impl PtsOffsetFilter {
    pub fn new(offset_ms: i64) -> Self {
        Self { offset_ms }
    }
}

impl Filter for PtsOffsetFilter {
    fn name(&self) -> &str {
        "pts_offset"
    }

    fn describe(&self) -> String {
        format!("pts_offset({:+}ms)", self.offset_ms)
    }

    fn apply(&mut self, _context: &mut FilterContext, frame: &mut Frame) {
        frame.pts += self.offset_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameKind;

    struct Disabled;

    impl Filter for Disabled {
        fn name(&self) -> &str {
            "disabled"
        }

        fn is_enabled(&self) -> bool {
            false
        }

        fn apply(&mut self, _context: &mut FilterContext, frame: &mut Frame) {
            frame.data.clear();
        }
    }

    #[test]
    fn test_chain_runs_enabled_filters_in_order() {
        let mut filters: Vec<Box<dyn Filter>> = vec![
            Box::new(PtsOffsetFilter::new(10)),
            Box::new(Disabled),
            Box::new(PtsOffsetFilter::new(-3)),
        ];
        let mut context = FilterContext::default();
        let mut frame = Frame::new(FrameKind::Video, 100, vec![1]);

        apply_chain(&mut filters, &mut context, &mut frame);

        assert_eq!(frame.pts, 107);
        assert_eq!(frame.data, vec![1]);
        assert_eq!(context.frames_processed, 1);
        assert_eq!(context.last_pts, Some(107));
    }

    #[test]
    fn test_describe_includes_offset() {
        assert_eq!(PtsOffsetFilter::new(-20).describe(), "pts_offset(-20ms)");
    }
}
