//! Deduplication and time-windowed merging of segments.

use super::segment::{Segment, TranscriptBlock};

/// Maximum span of one merged block, measured from its first segment's start.
const MERGE_WINDOW_SECS: f64 = 30.0;

/// Collapse duplicate segments and group the rest into display blocks.
///
/// Pass one drops any segment whose text equals the previously kept
/// segment's text (auto-captions repeat lines across rolling cues). Pass
/// two groups segments so that a block never spans the merge window: a
/// segment starting at exactly `block_start + 30.0` opens a new block, one
/// at `block_start + 29.999` stays in the current block.
pub fn merge_segments(segments: &[Segment]) -> Vec<TranscriptBlock> {
    let deduped = dedup_consecutive(segments);
    merge_windowed(&deduped)
}

fn dedup_consecutive(segments: &[Segment]) -> Vec<Segment> {
    let mut kept: Vec<Segment> = Vec::with_capacity(segments.len());

    for seg in segments {
        if let Some(prev) = kept.last() {
            if prev.text == seg.text {
                continue;
            }
        }
        kept.push(seg.clone());
    }

    kept
}

fn merge_windowed(segments: &[Segment]) -> Vec<TranscriptBlock> {
    let mut blocks = Vec::new();
    let mut block_start = 0.0_f64;
    let mut block_end = 0.0_f64;
    let mut texts: Vec<&str> = Vec::new();

    for seg in segments {
        if texts.is_empty() {
            block_start = seg.start;
        } else if seg.start - block_start >= MERGE_WINDOW_SECS {
            blocks.push(TranscriptBlock {
                start: block_start,
                end: block_end,
                text: texts.join(" "),
            });
            texts.clear();
            block_start = seg.start;
        }

        block_end = seg.end;
        texts.push(&seg.text);
    }

    if !texts.is_empty() {
        blocks.push(TranscriptBlock {
            start: block_start,
            end: block_end,
            text: texts.join(" "),
        });
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_consecutive_duplicates_collapse() {
        let segments = vec![
            seg(0.0, 2.0, "hello"),
            seg(2.0, 4.0, "hello"),
            seg(4.0, 6.0, "world"),
        ];

        let blocks = merge_segments(&segments);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "hello world");
        assert_eq!(blocks[0].start, 0.0);
        assert_eq!(blocks[0].end, 6.0);
    }

    #[test]
    fn test_non_adjacent_duplicates_kept() {
        let segments = vec![
            seg(0.0, 1.0, "a"),
            seg(1.0, 2.0, "b"),
            seg(2.0, 3.0, "a"),
        ];

        let blocks = merge_segments(&segments);
        assert_eq!(blocks[0].text, "a b a");
    }

    #[test]
    fn test_window_boundary() {
        // 29.999s into the block stays, exactly 30.0s opens a new block.
        let inside = vec![seg(0.0, 1.0, "a"), seg(29.999, 31.0, "b")];
        assert_eq!(merge_segments(&inside).len(), 1);

        let outside = vec![seg(0.0, 1.0, "a"), seg(30.0, 31.0, "b")];
        let blocks = merge_segments(&outside);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "a");
        assert_eq!(blocks[1].start, 30.0);
        assert_eq!(blocks[1].text, "b");
    }

    #[test]
    fn test_window_measured_from_block_start() {
        // Segments 20s apart chain without splitting until the window from
        // the block's first segment is exceeded.
        let segments = vec![
            seg(0.0, 5.0, "a"),
            seg(20.0, 25.0, "b"),
            seg(40.0, 45.0, "c"),
        ];

        let blocks = merge_segments(&segments);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "a b");
        assert_eq!(blocks[0].end, 25.0);
        assert_eq!(blocks[1].text, "c");
    }

    #[test]
    fn test_final_block_flushed() {
        let segments = vec![seg(0.0, 3.0, "only")];
        let blocks = merge_segments(&segments);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "only");
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_segments(&[]).is_empty());
    }
}
