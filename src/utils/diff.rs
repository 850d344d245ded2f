//! Line-based unified diff in the layout of `diff -u`, without timestamps.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// One edit step with the old/new line positions it starts at
#[derive(Debug, Clone, Copy)]
struct Step {
    op: Op,
    old: usize,
    new: usize,
}

pub const DEFAULT_CONTEXT: usize = 3;

/// Compute a unified diff between two texts.
///
/// Returns an empty string when the texts have identical lines.
pub fn unified_diff(old: &str, new: &str, from_label: &str, to_label: &str, context: usize) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let steps = edit_script(&a, &b);
    let hunks = group_hunks(&steps, context);
    if hunks.is_empty() {
        return String::new();
    }

    let mut out = Vec::new();
    out.push(format!("--- {}", from_label));
    out.push(format!("+++ {}", to_label));

    for (lo, hi) in hunks {
        let slice = &steps[lo..hi];
        let old_len = slice.iter().filter(|s| s.op != Op::Insert).count();
        let new_len = slice.iter().filter(|s| s.op != Op::Delete).count();
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(slice[0].old, old_len),
            format_range(slice[0].new, new_len)
        ));
        for step in slice {
            match step.op {
                Op::Equal => out.push(format!(" {}", a[step.old])),
                Op::Delete => out.push(format!("-{}", a[step.old])),
                Op::Insert => out.push(format!("+{}", b[step.new])),
            }
        }
    }

    out.join("\n")
}

/// Longest-common-subsequence edit script, deletions before insertions
fn edit_script(a: &[&str], b: &[&str]) -> Vec<Step> {
    let (n, m) = (a.len(), b.len());
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            steps.push(Step { op: Op::Equal, old: i, new: j });
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            steps.push(Step { op: Op::Delete, old: i, new: j });
            i += 1;
        } else {
            steps.push(Step { op: Op::Insert, old: i, new: j });
            j += 1;
        }
    }
    while i < n {
        steps.push(Step { op: Op::Delete, old: i, new: j });
        i += 1;
    }
    while j < m {
        steps.push(Step { op: Op::Insert, old: i, new: j });
        j += 1;
    }
    steps
}

/// Half-open step ranges covering each change plus `context` lines either side.
/// Changes separated by at most 2*context equal lines share a hunk.
fn group_hunks(steps: &[Step], context: usize) -> Vec<(usize, usize)> {
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for (k, step) in steps.iter().enumerate() {
        if step.op == Op::Equal {
            continue;
        }
        let lo = k.saturating_sub(context);
        let hi = (k + 1 + context).min(steps.len());
        match hunks.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => hunks.push((lo, hi)),
        }
    }
    hunks
}

fn format_range(start: usize, len: usize) -> String {
    let beginning = start + 1;
    match len {
        1 => beginning.to_string(),
        0 => format!("{},0", beginning - 1),
        _ => format!("{},{}", beginning, len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_produce_nothing() {
        let text = "interface Gig1\n description ACME\n";
        assert_eq!(unified_diff(text, text, "previous", "current", 3), "");
        assert_eq!(unified_diff("", "", "previous", "current", 3), "");
    }

    #[test]
    fn test_single_line_change() {
        let old = "a\nb\nc\n";
        let new = "a\nB\nc\n";
        assert_eq!(
            unified_diff(old, new, "previous", "current", 3),
            "--- previous\n+++ current\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c"
        );
    }

    #[test]
    fn test_append_to_empty() {
        assert_eq!(
            unified_diff("", "x\n", "previous", "current", 3),
            "--- previous\n+++ current\n@@ -0,0 +1 @@\n+x"
        );
    }

    #[test]
    fn test_distant_changes_split_into_hunks() {
        let old: Vec<String> = (1..=20).map(|n| format!("line {}", n)).collect();
        let mut new = old.clone();
        new[1] = "changed 2".to_string();
        new[18] = "changed 19".to_string();

        let diff = unified_diff(&old.join("\n"), &new.join("\n"), "a", "b", 3);
        let headers: Vec<&str> = diff.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(headers, vec!["@@ -1,5 +1,5 @@", "@@ -16,5 +16,5 @@"]);
    }

    #[test]
    fn test_nearby_changes_share_hunk() {
        let old: Vec<String> = (1..=12).map(|n| n.to_string()).collect();
        let mut new = old.clone();
        new[2] = "x".to_string();
        new[9] = "y".to_string();

        let diff = unified_diff(&old.join("\n"), &new.join("\n"), "a", "b", 3);
        assert_eq!(diff.lines().filter(|l| l.starts_with("@@")).count(), 1);
        assert!(diff.contains("-3\n+x"));
        assert!(diff.contains("-10\n+y"));
    }
}
