use crate::error::{Result, SolverError};

/// Largest supported board. Diagonal masks need `2n - 1` bits of a `u64`.
pub const MAX_BOARD_SIZE: u32 = 32;

/// Number of placement-stack levels that contribute to the progress estimate.
const PROGRESS_DEPTH: usize = 8;

/// Mutable state of an in-progress depth-first search.
///
/// Between two steps the state is always a *frontier* node: the placement
/// stack names the next partial board to expand, so it can be checkpointed
/// and restored without any extra cursor. A state with `row == 0` after at
/// least one step has exhausted the search tree.
///
/// The three attack-line masks are derived data. They are kept in sync by
/// [`place()`](Self::place) and [`remove()`](Self::remove) and rebuilt from the
/// stack by [`restore()`](Self::restore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    n: u32,
    row: u32,
    column_occupied: u64,
    diagonal_occupied: u64,
    anti_diagonal_occupied: u64,
    placement_stack: Vec<u32>,
    solutions_found: u64,
    steps_taken: u64,
}

impl SearchState {
    /// Create an empty board of size `n`.
    pub fn new(n: i64) -> Result<Self> {
        let n = checked_board_size(n)?;
        Ok(Self {
            n,
            row: 0,
            column_occupied: 0,
            diagonal_occupied: 0,
            anti_diagonal_occupied: 0,
            placement_stack: Vec::with_capacity(n as usize),
            solutions_found: 0,
            steps_taken: 0,
        })
    }

    /// Rebuild a state from its persisted fields.
    ///
    /// Replays every placement against fresh masks; a stack that does not
    /// match `row`, names a column outside the board or contains two
    /// attacking queens is rejected with [`SolverError::SearchStateCorruption`].
    pub fn restore(
        n: u32,
        row: u32,
        placements: &[u32],
        steps_taken: u64,
        solutions_found: u64,
    ) -> Result<Self> {
        let mut state = Self::new(i64::from(n))?;

        if row > n {
            return Err(SolverError::SearchStateCorruption(format!(
                "row {} exceeds board size {}",
                row, n
            )));
        }
        if placements.len() != row as usize {
            return Err(SolverError::SearchStateCorruption(format!(
                "placement stack holds {} entries but row is {}",
                placements.len(),
                row
            )));
        }

        for (r, &col) in placements.iter().enumerate() {
            if col >= n {
                return Err(SolverError::SearchStateCorruption(format!(
                    "row {} places a queen in column {} on a board of size {}",
                    r, col, n
                )));
            }
            if !state.is_free(col) {
                return Err(SolverError::SearchStateCorruption(format!(
                    "queen at row {}, column {} is attacked by an earlier placement",
                    r, col
                )));
            }
            state.place(col);
        }

        state.steps_taken = steps_taken;
        state.solutions_found = solutions_found;
        Ok(state)
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    /// Next row to place a queen in.
    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn column_occupied(&self) -> u64 {
        self.column_occupied
    }

    pub fn diagonal_occupied(&self) -> u64 {
        self.diagonal_occupied
    }

    pub fn anti_diagonal_occupied(&self) -> u64 {
        self.anti_diagonal_occupied
    }

    /// Column chosen for each filled row, in row order.
    pub fn placements(&self) -> &[u32] {
        &self.placement_stack
    }

    pub fn solutions_found(&self) -> u64 {
        self.solutions_found
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Every row holds a queen.
    pub fn is_complete(&self) -> bool {
        self.row == self.n
    }

    /// The whole search tree has been explored.
    pub fn is_finished(&self) -> bool {
        self.row == 0 && self.steps_taken > 0
    }

    /// Whether `col` in the current row is attacked by no placed queen.
    pub fn is_free(&self, col: u32) -> bool {
        let row = self.row;
        let diagonal = row + col;
        let anti_diagonal = row + self.n - 1 - col;

        self.column_occupied & (1 << col) == 0
            && self.diagonal_occupied & (1 << diagonal) == 0
            && self.anti_diagonal_occupied & (1 << anti_diagonal) == 0
    }

    /// Bit `c` is set iff column `c` of the current row is free.
    pub fn free_columns(&self) -> u64 {
        if self.row >= self.n {
            return 0;
        }
        let width = self.n;
        let full = (1u64 << width) - 1;
        let diagonal = (self.diagonal_occupied >> self.row) & full;
        // anti-diagonal bit (row + n - 1 - c) lands on bit n - 1 - c after the
        // shift, so mirror the low n bits back into column order
        let mirrored = (self.anti_diagonal_occupied >> self.row) & full;
        let anti_diagonal = mirrored.reverse_bits() >> (64 - width);

        !(self.column_occupied | diagonal | anti_diagonal) & full
    }

    /// Place a queen at `col` in the current row and advance to the next row.
    pub fn place(&mut self, col: u32) {
        debug_assert!(self.row < self.n, "board is already full");
        debug_assert!(self.is_free(col), "column {} is attacked", col);

        let row = self.row;
        self.column_occupied |= 1 << col;
        self.diagonal_occupied |= 1 << (row + col);
        self.anti_diagonal_occupied |= 1 << (row + self.n - 1 - col);
        self.placement_stack.push(col);
        self.row += 1;
    }

    /// Undo the most recent placement, returning its column.
    pub fn remove(&mut self) -> Option<u32> {
        let col = self.placement_stack.pop()?;
        self.row -= 1;

        let row = self.row;
        self.column_occupied &= !(1 << col);
        self.diagonal_occupied &= !(1 << (row + col));
        self.anti_diagonal_occupied &= !(1 << (row + self.n - 1 - col));
        Some(col)
    }

    pub fn record_solution(&mut self) {
        self.solutions_found += 1;
    }

    pub fn record_step(&mut self) {
        self.steps_taken += 1;
    }

    /// Estimated fraction of the search tree already explored.
    ///
    /// Reads the placement stack as a mixed-radix fraction: the first row
    /// counts completed first-row branches, deeper rows refine the estimate
    /// within the open branch. Depth-first order visits stacks in increasing
    /// lexicographic order, so the estimate never decreases during a run.
    /// It stays below 1.0 until the search is finished.
    pub fn progress_estimate(&self) -> f64 {
        if self.is_finished() {
            return 1.0;
        }
        let radix = f64::from(self.n);
        let mut scale = 1.0;
        let mut estimate = 0.0;
        for &col in self.placement_stack.iter().take(PROGRESS_DEPTH) {
            scale /= radix;
            estimate += f64::from(col) * scale;
        }
        estimate
    }
}

fn checked_board_size(n: i64) -> Result<u32> {
    match u32::try_from(n) {
        Ok(size) if (1..=MAX_BOARD_SIZE).contains(&size) => Ok(size),
        _ => Err(SolverError::InvalidBoardSize(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = SearchState::new(8).unwrap();
        assert_eq!(state.n(), 8);
        assert_eq!(state.row(), 0);
        assert!(state.placements().is_empty());
        assert_eq!(state.column_occupied(), 0);
        assert!(!state.is_finished());
        assert_eq!(state.free_columns(), 0xFF);
    }

    #[test]
    fn test_invalid_board_sizes() {
        for n in [0, -1, -100, i64::from(MAX_BOARD_SIZE) + 1, i64::MAX] {
            assert!(
                matches!(SearchState::new(n), Err(SolverError::InvalidBoardSize(v)) if v == n),
                "board size {} should be rejected",
                n
            );
        }
        assert!(SearchState::new(1).is_ok());
        assert!(SearchState::new(i64::from(MAX_BOARD_SIZE)).is_ok());
    }

    #[test]
    fn test_place_sets_attack_lines() {
        let mut state = SearchState::new(4).unwrap();
        state.place(1);

        assert_eq!(state.row(), 1);
        assert_eq!(state.column_occupied(), 0b0010);
        assert_eq!(state.diagonal_occupied(), 1 << 1);
        assert_eq!(state.anti_diagonal_occupied(), 1 << 2);

        // row 1: column 1 shares the column, 0 and 2 share a diagonal
        assert!(!state.is_free(0));
        assert!(!state.is_free(1));
        assert!(!state.is_free(2));
        assert!(state.is_free(3));
        assert_eq!(state.free_columns(), 0b1000);
    }

    #[test]
    fn test_remove_restores_masks() {
        let mut state = SearchState::new(6).unwrap();
        state.place(0);
        state.place(2);
        let before = state.clone();
        state.place(4);

        assert_eq!(state.remove(), Some(4));
        assert_eq!(state, before);

        state.remove();
        state.remove();
        assert_eq!(state.remove(), None);
        assert_eq!(state.column_occupied(), 0);
        assert_eq!(state.diagonal_occupied(), 0);
        assert_eq!(state.anti_diagonal_occupied(), 0);
    }

    #[test]
    fn test_free_columns_matches_scalar_check() {
        let mut state = SearchState::new(9).unwrap();
        for col in [1, 3, 5] {
            state.place(col);
        }
        let mask = state.free_columns();
        for col in 0..9 {
            assert_eq!(mask & (1 << col) != 0, state.is_free(col), "column {}", col);
        }
    }

    #[test]
    fn test_free_columns_on_largest_board() {
        let mut state = SearchState::new(i64::from(MAX_BOARD_SIZE)).unwrap();
        state.place(31);
        state.place(0);
        let mask = state.free_columns();
        for col in 0..MAX_BOARD_SIZE {
            assert_eq!(mask & (1 << col) != 0, state.is_free(col), "column {}", col);
        }
    }

    #[test]
    fn test_restore_rebuilds_masks() {
        let mut live = SearchState::new(8).unwrap();
        for col in [0, 4, 7, 5] {
            live.place(col);
        }
        for _ in 0..11 {
            live.record_step();
        }
        live.record_solution();

        let restored = SearchState::restore(8, 4, &[0, 4, 7, 5], 11, 1).unwrap();
        assert_eq!(restored, live);
    }

    #[test]
    fn test_restore_rejects_corruption() {
        let corrupt = |row, stack: &[u32]| {
            matches!(
                SearchState::restore(8, row, stack, 5, 0),
                Err(SolverError::SearchStateCorruption(_))
            )
        };

        assert!(corrupt(3, &[0, 4]));
        assert!(corrupt(9, &[0; 9]));
        assert!(corrupt(2, &[0, 8]));
        // same column
        assert!(corrupt(2, &[3, 3]));
        // shared diagonal
        assert!(corrupt(2, &[3, 2]));
        // shared anti-diagonal
        assert!(corrupt(2, &[3, 4]));
        assert!(matches!(
            SearchState::restore(0, 0, &[], 0, 0),
            Err(SolverError::InvalidBoardSize(0))
        ));
    }

    #[test]
    fn test_progress_estimate_is_lexicographic() {
        let mut state = SearchState::new(4).unwrap();
        assert_eq!(state.progress_estimate(), 0.0);

        state.place(1);
        assert_eq!(state.progress_estimate(), 0.25);
        state.place(3);
        let deeper = state.progress_estimate();
        assert!(deeper > 0.25 && deeper < 0.5);

        state.remove();
        state.remove();
        state.place(2);
        assert!(state.progress_estimate() > deeper);
    }

    #[test]
    fn test_finished_state() {
        let mut state = SearchState::new(1).unwrap();
        assert!(!state.is_finished());
        state.record_step();
        assert!(state.is_finished());
        assert_eq!(state.progress_estimate(), 1.0);
    }
}
