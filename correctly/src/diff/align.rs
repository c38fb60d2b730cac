use super::{WordDiff, same_word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep { corrected: usize },
    Replace { original: usize, corrected: usize },
    Insert { before: usize, corrected: usize },
    Delete { original: usize },
}

/// LCS alignment of the two token sequences.
///
/// Positions in the produced diffs index the original sequence; an insert at
/// `p` goes in front of the original token `p`.
pub fn aligned_diff(original: &[&str], corrected: &[&str]) -> Vec<WordDiff> {
    align(original, corrected)
        .into_iter()
        .filter_map(|step| match step {
            Step::Keep { .. } => None,
            Step::Replace {
                original: at,
                corrected: with,
            } => Some(WordDiff::replace(at, original[at], corrected[with])),
            Step::Insert { before, corrected: with } => {
                Some(WordDiff::insert(before, corrected[with]))
            }
            Step::Delete { original: at } => Some(WordDiff::delete(at, original[at])),
        })
        .collect()
}

pub(crate) fn changed_corrected_tokens(original: &[&str], corrected: &[&str]) -> Vec<bool> {
    let mut changed = vec![true; corrected.len()];
    for step in align(original, corrected) {
        if let Step::Keep { corrected: index } = step {
            changed[index] = false;
        }
    }
    changed
}

fn align(original: &[&str], corrected: &[&str]) -> Vec<Step> {
    let rows = original.len();
    let cols = corrected.len();

    // lcs[i][j] holds the LCS length of original[i..] and corrected[j..].
    let mut lcs = vec![vec![0_usize; cols + 1]; rows + 1];
    for i in (0..rows).rev() {
        for j in (0..cols).rev() {
            lcs[i][j] = if same_word(original[i], corrected[j]) {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(rows.max(cols));
    let (mut i, mut j) = (0, 0);
    while i < rows || j < cols {
        if i < rows && j < cols {
            if same_word(original[i], corrected[j]) {
                steps.push(Step::Keep { corrected: j });
                i += 1;
                j += 1;
                continue;
            }
            if lcs[i + 1][j + 1] == lcs[i][j] {
                steps.push(Step::Replace {
                    original: i,
                    corrected: j,
                });
                i += 1;
                j += 1;
                continue;
            }
        }

        if j < cols && (i == rows || lcs[i][j + 1] >= lcs[i + 1][j]) {
            steps.push(Step::Insert {
                before: i,
                corrected: j,
            });
            j += 1;
        } else {
            steps.push(Step::Delete { original: i });
            i += 1;
        }
    }

    steps
}
