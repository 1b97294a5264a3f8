//! External content providers for the jail minigame: a random-riddle API and
//! a sudoku generator. Both are plain HTTPS GET endpoints; failures surface as
//! errors and are rendered to the invoking moderator, never retried here.

use serde::Deserialize;

const RIDDLE_URL: &str = "https://riddles-api.vercel.app/random";
const SUDOKU_URL: &str =
    "https://sudoku-api.vercel.app/api/dosuku?query={newboard(limit:1){grids{value,solution,difficulty}}}";

#[derive(Debug, Deserialize)]
pub struct RiddleContent {
    pub riddle: String,
    pub answer: String,
}

#[derive(Debug)]
pub struct SudokuContent {
    /// 81-char row-major digit string, `0` for empty cells.
    pub grid: String,
    pub solution: String,
    pub difficulty: String,
}

#[derive(Deserialize)]
struct SudokuResponse {
    newboard: NewBoard,
}

#[derive(Deserialize)]
struct NewBoard {
    grids: Vec<SudokuGrid>,
}

#[derive(Deserialize)]
struct SudokuGrid {
    value: Vec<Vec<u8>>,
    solution: Vec<Vec<u8>>,
    difficulty: String,
}

pub async fn fetch_riddle() -> anyhow::Result<RiddleContent> {
    let response = reqwest::get(RIDDLE_URL).await?.error_for_status()?;
    let riddle = response.json::<RiddleContent>().await?;
    Ok(riddle)
}

fn flatten(rows: &[Vec<u8>]) -> String {
    rows.iter()
        .flat_map(|row| row.iter().map(|n| char::from(b'0' + n)))
        .collect()
}

pub async fn fetch_sudoku() -> anyhow::Result<SudokuContent> {
    let response = reqwest::get(SUDOKU_URL).await?.error_for_status()?;
    let body = response.json::<SudokuResponse>().await?;
    let grid = body
        .newboard
        .grids
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("sudoku API returned no grids"))?;
    Ok(SudokuContent {
        grid: flatten(&grid.value),
        solution: flatten(&grid.solution),
        difficulty: grid.difficulty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_is_row_major() {
        let rows = vec![vec![5, 0, 3], vec![1, 2, 9]];
        assert_eq!(flatten(&rows), "503129");
    }

    #[test]
    fn sudoku_response_shape_parses() {
        let body = r#"{"newboard":{"grids":[{"value":[[0,1],[2,3]],"solution":[[4,1],[2,3]],"difficulty":"Easy"}]}}"#;
        let parsed: SudokuResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.newboard.grids[0].difficulty, "Easy");
        assert_eq!(flatten(&parsed.newboard.grids[0].value), "0123");
    }
}
