use crate::model::{Video, VideoId};

/// An in-memory ballot under construction.
///
/// Voters refine a ranking by nudging one video at a time up or down from the
/// presented order, then submit the final sequence. The draft never touches
/// the store; submission validates the result against the bound video set.
///
/// ```
/// use video_ranking::{BallotDraft, VideoId};
///
/// let mut draft = BallotDraft::new(vec![VideoId(1), VideoId(2), VideoId(3)]);
/// draft.move_up(VideoId(3));
/// draft.move_up(VideoId(3));
/// assert_eq!(draft.ranking(), &[VideoId(3), VideoId(1), VideoId(2)]);
/// ```
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotDraft {
    order: Vec<VideoId>,
}

impl BallotDraft {
    /// Starts from an explicit order, best first.
    pub fn new(order: Vec<VideoId>) -> BallotDraft {
        BallotDraft { order }
    }

    /// Starts from videos in their presentation order.
    pub fn from_videos(videos: &[Video]) -> BallotDraft {
        BallotDraft {
            order: videos.iter().map(|v| v.id).collect(),
        }
    }

    /// 0-based position of a video in the current order.
    pub fn position(&self, video: VideoId) -> Option<usize> {
        self.order.iter().position(|v| *v == video)
    }

    /// Swaps the video with its better-ranked neighbour. No-op at the top or
    /// for an unknown id; returns whether anything moved.
    pub fn move_up(&mut self, video: VideoId) -> bool {
        match self.position(video) {
            Some(p) if p > 0 => {
                self.order.swap(p, p - 1);
                true
            }
            _ => false,
        }
    }

    /// Swaps the video with its worse-ranked neighbour. No-op at the bottom
    /// or for an unknown id; returns whether anything moved.
    pub fn move_down(&mut self, video: VideoId) -> bool {
        match self.position(video) {
            Some(p) if p + 1 < self.order.len() => {
                self.order.swap(p, p + 1);
                true
            }
            _ => false,
        }
    }

    /// The current order, best first.
    pub fn ranking(&self) -> &[VideoId] {
        &self.order
    }

    pub fn into_ranking(self) -> Vec<VideoId> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> BallotDraft {
        BallotDraft::new(vec![VideoId(10), VideoId(20), VideoId(30)])
    }

    #[test]
    fn test_edges_are_no_ops() {
        let mut d = draft();
        assert!(!d.move_up(VideoId(10)));
        assert!(!d.move_down(VideoId(30)));
        assert!(!d.move_up(VideoId(99)));
        assert_eq!(d, draft());
    }

    #[test]
    fn test_swaps() {
        let mut d = draft();
        assert!(d.move_down(VideoId(10)));
        assert_eq!(d.ranking(), &[VideoId(20), VideoId(10), VideoId(30)]);
        assert!(d.move_up(VideoId(30)));
        assert_eq!(d.ranking(), &[VideoId(20), VideoId(30), VideoId(10)]);
        assert_eq!(d.position(VideoId(10)), Some(2));
    }

    #[test]
    fn test_into_ranking() {
        let mut d = draft();
        d.move_up(VideoId(20));
        assert_eq!(
            d.into_ranking(),
            vec![VideoId(20), VideoId(10), VideoId(30)]
        );
    }
}
