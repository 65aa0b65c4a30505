/// Per-row column ranges `[left, right)` of the cost matrix that get evaluated.
pub(crate) struct Window {
    pub(crate) window: Vec<(usize, usize)>,
    len_y: usize,
}

impl Window {
    pub(crate) fn new(len_x: usize, len_y: usize) -> Self {
        Self {
            window: vec![(usize::MAX, usize::MIN); len_x],
            len_y,
        }
    }

    pub(crate) fn mark_visited(&mut self, x: usize, y: usize) {
        let Some((left, right)) = self.window.get(x).copied() else {
            return;
        };
        self.window[x] = (left.min(y), right.max(y + 1).min(self.len_y));
    }
}
