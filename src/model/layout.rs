use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellAssignment {
    pub row: usize,
    pub col: usize,
    /// Position of the sample in the included, ordered sample list.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutPlan {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<CellAssignment>,
}

impl LayoutPlan {
    pub fn empty_cells(&self) -> usize {
        self.rows * self.cols - self.cells.len()
    }
}
