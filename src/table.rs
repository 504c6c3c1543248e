use chrono::Local;

use crate::job::Job;

const HEADERS: [&str; 4] = ["NAME", "STATUS", "BUILD DATE", "DURATION"];
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn row(job: &Job) -> [String; 4] {
    let status = if job.running {
        "running".to_string()
    } else {
        job.result.to_lowercase()
    };
    let (date, duration) = if job.has_build() {
        (
            job.last_build_created_at
                .with_timezone(&Local)
                .format(DATE_FORMAT)
                .to_string(),
            format!("{:.1}s", job.last_build_duration),
        )
    } else {
        (String::new(), String::new())
    };
    [job.name.clone(), status, date, duration]
}

/// Renders jobs as a bordered text table, one row per job.
pub fn render(jobs: &[Job]) -> String {
    let rows: Vec<[String; 4]> = jobs.iter().map(row).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let separator = {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };
    let format_line = |cells: &[&str]| {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(widths) {
            let padding = width - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(padding + 1));
            line.push('|');
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(separator.clone());
    out.push(format_line(&HEADERS));
    out.push(separator.clone());
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push(format_line(&cells));
    }
    out.push(separator);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{BuildResult, JobHandle};
    use crate::testing::{finished, running};

    fn handle(id: usize, name: &str) -> JobHandle {
        JobHandle {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn renders_one_row_per_job() {
        let jobs = vec![
            Job::from_build(handle(0, "api"), finished(BuildResult::Success)),
            Job::from_build(handle(1, "deploy-production"), running()),
            Job::never_built(handle(2, "docs")),
        ];

        let table = render(&jobs);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 7);
        assert!(lines[1].starts_with("| NAME              | STATUS   |"));
        assert!(lines[3].starts_with("| api               | success  |"));
        assert!(lines[3].contains("12.0s"));
        assert!(lines[4].starts_with("| deploy-production | running  |"));
        assert!(lines[5].starts_with("| docs              | no_build |"));
        assert!(!lines[5].contains(':'));
        // every line has the same width
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn empty_table_has_headers_only() {
        let table = render(&[]);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("BUILD DATE"));
    }
}
