//! Puzzle logic for the jail minigame: sudoku grid handling and the seam for
//! checking riddle answers.

/// Decides whether a submitted answer matches a riddle solution. The semantic
/// similarity model lives outside this crate; implementations plug in here.
pub trait AnswerChecker: Send + Sync {
    fn matches(&self, solution: &str, answer: &str) -> bool;
}

/// Case- and punctuation-insensitive comparison. Good enough for one-word
/// riddle answers; swap in a similarity-backed checker for fuzzier matching.
pub struct NormalisedChecker;

fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

impl AnswerChecker for NormalisedChecker {
    fn matches(&self, solution: &str, answer: &str) -> bool {
        let solution = normalise(solution);
        !solution.is_empty() && solution == normalise(answer)
    }
}

pub type Grid = [[u8; 9]; 9];

/// Parse an 81-character row-major digit string, `0` for empty cells.
pub fn parse_grid(s: &str) -> Option<Grid> {
    if s.len() != 81 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut grid = [[0u8; 9]; 9];
    for (i, b) in s.bytes().enumerate() {
        grid[i / 9][i % 9] = b - b'0';
    }
    Some(grid)
}

fn is_valid_group(mut group: [u8; 9]) -> bool {
    group.sort_unstable();
    group == [1, 2, 3, 4, 5, 6, 7, 8, 9]
}

/// Full sudoku validation: the submitted solution must preserve every given
/// cell and satisfy all rows, columns and 3×3 boxes. An inmate's alternative
/// solution counts even when it differs from the one we stored.
pub fn is_valid_solution(puzzle: &Grid, solution: &Grid) -> bool {
    for r in 0..9 {
        for c in 0..9 {
            if puzzle[r][c] != 0 && puzzle[r][c] != solution[r][c] {
                return false;
            }
        }
    }

    for i in 0..9 {
        let row = solution[i];
        let mut col = [0u8; 9];
        for r in 0..9 {
            col[r] = solution[r][i];
        }
        if !is_valid_group(row) || !is_valid_group(col) {
            return false;
        }
    }

    for box_row in (0..9).step_by(3) {
        for box_col in (0..9).step_by(3) {
            let mut block = [0u8; 9];
            let mut i = 0;
            for r in box_row..box_row + 3 {
                for c in box_col..box_col + 3 {
                    block[i] = solution[r][c];
                    i += 1;
                }
            }
            if !is_valid_group(block) {
                return false;
            }
        }
    }

    true
}

/// Monospace rendering of a grid with box dividers, `.` for empty cells.
pub fn display_grid(grid: &Grid) -> String {
    let mut lines = Vec::new();
    for (i, row) in grid.iter().enumerate() {
        let cell = |n: &u8| {
            if *n == 0 {
                ".".to_string()
            } else {
                n.to_string()
            }
        };
        let line = format!(
            "{} | {} | {}",
            row[..3].iter().map(cell).collect::<Vec<_>>().join(" "),
            row[3..6].iter().map(cell).collect::<Vec<_>>().join(" "),
            row[6..].iter().map(cell).collect::<Vec<_>>().join(" "),
        );
        lines.push(line);
        if i == 2 || i == 5 {
            lines.push("-".repeat(21));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLVED: &str =
        "534678912672195348198342567859761423426853791713924856961537284287419635345286179";

    fn blank_some(s: &str, holes: &[usize]) -> String {
        let mut bytes = s.as_bytes().to_vec();
        for &h in holes {
            bytes[h] = b'0';
        }
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_grid("123").is_none());
        assert!(parse_grid(&"x".repeat(81)).is_none());
        assert!(parse_grid(SOLVED).is_some());
    }

    #[test]
    fn solved_grid_validates_against_its_puzzle() {
        let puzzle = parse_grid(&blank_some(SOLVED, &[0, 10, 40, 80])).unwrap();
        let solution = parse_grid(SOLVED).unwrap();
        assert!(is_valid_solution(&puzzle, &solution));
    }

    #[test]
    fn changing_a_given_cell_invalidates() {
        let puzzle = parse_grid(&blank_some(SOLVED, &[1])).unwrap();
        let mut solution = parse_grid(SOLVED).unwrap();
        // Swap two cells in row 0; both were givens.
        solution[0].swap(2, 3);
        assert!(!is_valid_solution(&puzzle, &solution));
    }

    #[test]
    fn duplicate_in_row_invalidates() {
        let puzzle = parse_grid(&"0".repeat(81)).unwrap();
        let mut solution = parse_grid(SOLVED).unwrap();
        solution[4][4] = solution[4][3];
        assert!(!is_valid_solution(&puzzle, &solution));
    }

    #[test]
    fn display_marks_empty_cells() {
        let grid = parse_grid(&blank_some(SOLVED, &[0])).unwrap();
        let shown = display_grid(&grid);
        assert!(shown.starts_with(". 3 4 | 6 7 8 | 9 1 2"));
        assert_eq!(shown.lines().count(), 11);
    }

    #[test]
    fn normalised_checker_ignores_case_and_punctuation() {
        let checker = NormalisedChecker;
        assert!(checker.matches("A piano!", "a PIANO"));
        assert!(!checker.matches("a piano", "a guitar"));
        assert!(!checker.matches("", ""));
    }
}
