//! CSV and HTML reports over match statistics.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

use super::stats::{StatLine, TeamSummary};
use crate::error::RallyError;
use crate::features::sync::FetchQuery;

/// One projection for every report kind, so any report can be cut from a
/// cached copy of the whole table.
const REPORT_COLUMNS: &str = "playerId,\
matches(id,date,opponent,result,score,location,notes),\
players(id,firstName,lastName,position,jerseyNumber),\
serves,aces,kills,blocks,digs,assists,errors,points";

const HTML_STYLE: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; }
table { width: 100%; border-collapse: collapse; margin: 20px 0; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f5f5f5; }
.header { text-align: center; margin-bottom: 30px; }
.summary { margin: 20px 0; }";

/// What a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// Every player in every match
    Team,
    /// One player across matches
    Player,
    /// Every player in one match
    Match,
}

impl ExportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Player => "player",
            Self::Match => "match",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Team => "Team Performance Report",
            Self::Player => "Player Statistics Report",
            Self::Match => "Match Report",
        }
    }

    /// CSV header row.
    #[must_use]
    pub const fn headers(self) -> &'static [&'static str] {
        match self {
            Self::Team => &[
                "Date", "Opponent", "Result", "Score", "Player", "Position", "Serves", "Aces",
                "Kills", "Blocks", "Digs", "Assists", "Errors", "Points",
            ],
            Self::Player => &[
                "Date", "Opponent", "Result", "Score", "Serves", "Aces", "Kills", "Blocks",
                "Digs", "Assists", "Errors", "Points",
            ],
            Self::Match => &[
                "Player", "Position", "Jersey", "Serves", "Aces", "Kills", "Blocks", "Digs",
                "Assists", "Errors", "Points",
            ],
        }
    }

    /// One CSV record for `line`, matching [`Self::headers`].
    #[must_use]
    pub fn row(self, line: &StatLine) -> Vec<String> {
        let game = line.game.clone().unwrap_or_default();
        let player = line.player.clone().unwrap_or_default();
        let text = |v: Option<String>| v.unwrap_or_default();

        let match_cells = || {
            vec![
                text(game.date.clone()),
                text(game.opponent.clone()),
                text(game.result.clone()),
                text(game.score.clone()),
            ]
        };
        let counts = [
            line.serves,
            line.aces,
            line.kills,
            line.blocks,
            line.digs,
            line.assists,
            line.errors,
            line.points,
        ]
        .map(|n| n.to_string());

        let mut cells = match self {
            Self::Team => {
                let mut cells = match_cells();
                cells.push(player.full_name());
                cells.push(text(player.position.clone()));
                cells
            }
            Self::Player => match_cells(),
            Self::Match => vec![
                player.full_name(),
                text(player.position.clone()),
                text(player.jersey_number.clone()),
            ],
        };
        cells.extend(counts);
        cells
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File format of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Spreadsheet rows
    #[default]
    Csv,
    /// Printable document with a summary and the rows as a table
    Html,
}

/// Filters for a report.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub player_id: Option<String>,
    pub match_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ExportOptions {
    /// Build the `match_stats` query for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `RallyError::InvalidOperation` if a player report has no player
    /// id or a match report has no match id.
    pub fn query(&self, kind: ExportKind) -> Result<FetchQuery, RallyError> {
        let base = FetchQuery::all().select(REPORT_COLUMNS);
        let mut query = match kind {
            ExportKind::Team => base,
            ExportKind::Player => base.eq("playerId", self.required_player()?),
            ExportKind::Match => return Ok(base.eq("matches.id", self.required_match()?)),
        };

        if let Some(from) = self.from {
            query = query.gte("matches.date", from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = self.to {
            query = query.lte("matches.date", to.format("%Y-%m-%d").to_string());
        }
        Ok(query)
    }

    fn required_player(&self) -> Result<&str, RallyError> {
        self.player_id
            .as_deref()
            .ok_or_else(|| RallyError::InvalidOperation("Player ID is required".to_string()))
    }

    fn required_match(&self) -> Result<&str, RallyError> {
        self.match_id
            .as_deref()
            .ok_or_else(|| RallyError::InvalidOperation("Match ID is required".to_string()))
    }

    /// Keep the lines a `kind` report covers.
    ///
    /// Player reports keep the player's lines, match reports the match's, and
    /// team and player reports the date range. The remote only filters the
    /// embedded match, so rows whose match fell outside a filter come back
    /// with no match attached; a cached snapshot is not filtered at all.
    #[must_use]
    pub fn filter(&self, kind: ExportKind, lines: Vec<StatLine>) -> Vec<StatLine> {
        lines
            .into_iter()
            .filter(|line| match kind {
                ExportKind::Team => line.in_range(self.from, self.to),
                ExportKind::Player => {
                    line.player_key() == self.player_id.as_deref()
                        && line.in_range(self.from, self.to)
                }
                ExportKind::Match => line.match_key() == self.match_id.as_deref(),
            })
            .collect()
    }
}

/// `<kind>_stats_<YYYY-MM-DD>.csv` or `<kind>_report_<YYYY-MM-DD>.html`
#[must_use]
pub fn file_name(kind: ExportKind, format: ReportFormat, date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    match format {
        ReportFormat::Csv => format!("{}_stats_{date}.csv", kind.as_str()),
        ReportFormat::Html => format!("{}_report_{date}.html", kind.as_str()),
    }
}

/// Write the header and one record per line.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(kind: ExportKind, lines: &[StatLine], out: W) -> Result<(), RallyError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(kind.headers())?;
    for line in lines {
        writer.write_record(kind.row(line))?;
    }
    writer.flush()?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Render the report as a standalone HTML document: title, generation
/// date, summary, then one table row per line.
#[must_use]
pub fn render_html(
    kind: ExportKind,
    lines: &[StatLine],
    summary: &TeamSummary,
    generated_on: NaiveDate,
) -> String {
    let title = kind.title();
    let mut html = vec![
        "<!DOCTYPE html>".to_string(),
        "<html>".to_string(),
        "<head>".to_string(),
        "<meta charset=\"utf-8\">".to_string(),
        format!("<title>{title}</title>"),
        format!("<style>\n{HTML_STYLE}\n</style>"),
        "</head>".to_string(),
        "<body>".to_string(),
        "<div class=\"header\">".to_string(),
        format!("<h1>{title}</h1>"),
        format!("<p>Generated on {}</p>", generated_on.format("%Y-%m-%d")),
        "</div>".to_string(),
        "<div class=\"summary\">".to_string(),
        format!(
            "<p>Matches: {} &middot; Wins: {} &middot; Losses: {} &middot; Win rate: {:.1}%</p>",
            summary.matches_played,
            summary.wins,
            summary.losses,
            summary.win_rate * 100.0
        ),
    ];

    if !summary.players.is_empty() {
        html.push("<table>".to_string());
        html.push(table_row(
            "th",
            ["Player", "Matches", "Kills", "Aces", "Blocks", "Digs", "Points"],
        ));
        for p in &summary.players {
            html.push(table_row(
                "td",
                [
                    p.player.clone(),
                    p.matches.to_string(),
                    format!("{:.1}", p.kills),
                    format!("{:.1}", p.aces),
                    format!("{:.1}", p.blocks),
                    format!("{:.1}", p.digs),
                    format!("{:.1}", p.points),
                ],
            ));
        }
        html.push("</table>".to_string());
    }
    html.push("</div>".to_string());

    html.push("<table>".to_string());
    html.push(table_row("th", kind.headers().iter().copied()));
    for line in lines {
        html.push(table_row("td", kind.row(line)));
    }
    html.push("</table>".to_string());
    html.push("</body>".to_string());
    html.push("</html>".to_string());

    html.join("\n")
}

fn table_row<I, S>(tag: &str, cells: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cells: String = cells
        .into_iter()
        .map(|cell| format!("<{tag}>{}</{tag}>", escape(cell.as_ref())))
        .collect();
    format!("<tr>{cells}</tr>")
}

/// Write the report into `dir` under its dated file name.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn export_report(
    kind: ExportKind,
    format: ReportFormat,
    lines: &[StatLine],
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf, RallyError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name(kind, format, date));
    let mut file = std::fs::File::create(&path)?;

    match format {
        ReportFormat::Csv => write_csv(kind, lines, file)?,
        ReportFormat::Html => {
            let summary = TeamSummary::calculate(lines);
            file.write_all(render_html(kind, lines, &summary, date).as_bytes())?;
        }
    }

    tracing::info!("Exported {} {kind} row(s) to {}", lines.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn lines() -> Vec<StatLine> {
        StatLine::parse_rows(&json!([
            {
                "matches": {"id": 1, "date": "2024-03-02", "opponent": "Sharks, Inc", "result": "win", "score": "3-1"},
                "players": {"firstName": "Ana", "lastName": "Lee", "position": "Setter", "jerseyNumber": 4},
                "serves": 10, "aces": 2, "kills": 3, "blocks": 1, "digs": 5, "assists": 30, "errors": 2, "points": 6
            },
            {
                "matches": null,
                "players": {"firstName": "Bea", "lastName": "Ruiz", "position": "Libero", "jerseyNumber": "9"},
                "digs": 12
            }
        ]))
        .unwrap()
    }

    fn render(kind: ExportKind, lines: &[StatLine]) -> String {
        let mut out = Vec::new();
        write_csv(kind, lines, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_team_csv() {
        let csv = render(ExportKind::Team, &lines()[..1]);
        let mut rows = csv.lines();

        assert_eq!(
            rows.next(),
            Some("Date,Opponent,Result,Score,Player,Position,Serves,Aces,Kills,Blocks,Digs,Assists,Errors,Points")
        );
        assert_eq!(
            rows.next(),
            Some("2024-03-02,\"Sharks, Inc\",win,3-1,Ana Lee,Setter,10,2,3,1,5,30,2,6")
        );
        assert_eq!(rows.next(), None);
    }

    #[test]
    fn test_match_csv() {
        let csv = render(ExportKind::Match, &lines());
        let rows: Vec<_> = csv.lines().collect();

        assert_eq!(rows[0], "Player,Position,Jersey,Serves,Aces,Kills,Blocks,Digs,Assists,Errors,Points");
        assert_eq!(rows[2], "Bea Ruiz,Libero,9,0,0,0,0,12,0,0,0");
    }

    #[test]
    fn test_row_width_matches_headers() {
        for kind in [ExportKind::Team, ExportKind::Player, ExportKind::Match] {
            for line in lines() {
                assert_eq!(kind.row(&line).len(), kind.headers().len());
            }
        }
    }

    #[test]
    fn test_query_requires_ids() {
        let options = ExportOptions::default();
        assert!(options.query(ExportKind::Player).is_err());
        assert!(options.query(ExportKind::Match).is_err());
        assert!(options.query(ExportKind::Team).is_ok());
    }

    #[test]
    fn test_query_filters() {
        let options = ExportOptions {
            player_id: Some("p1".to_string()),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 6, 30),
            ..ExportOptions::default()
        };
        let params = options.query(ExportKind::Player).unwrap().to_params();

        assert!(params.contains(&("playerId".to_string(), "eq.p1".to_string())));
        assert!(params.contains(&("matches.date".to_string(), "gte.2024-01-01".to_string())));
        assert!(params.contains(&("matches.date".to_string(), "lte.2024-06-30".to_string())));
    }

    #[test]
    fn test_filter_drops_rows_outside_range() {
        let options = ExportOptions {
            from: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..ExportOptions::default()
        };
        let kept = options.filter(ExportKind::Team, lines());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kills, 3);
    }

    fn team_rows() -> Vec<StatLine> {
        StatLine::parse_rows(&json!([
            {"playerId": "p1", "matches": {"id": 1, "date": "2024-03-02"}, "players": {"id": "p1"}, "kills": 3},
            {"playerId": "p2", "matches": {"id": 1, "date": "2024-03-02"}, "players": {"id": "p2"}, "kills": 7},
            {"playerId": "p2", "matches": {"id": 2, "date": "2024-04-13"}, "players": {"id": "p2"}, "kills": 9}
        ]))
        .unwrap()
    }

    #[test]
    fn test_filter_keeps_requested_player() {
        let options = ExportOptions {
            player_id: Some("p2".to_string()),
            ..ExportOptions::default()
        };

        let kept = options.filter(ExportKind::Player, team_rows());
        assert_eq!(kept.iter().map(|l| l.kills).collect::<Vec<_>>(), vec![7, 9]);

        // Team reports ignore the player id.
        assert_eq!(options.filter(ExportKind::Team, team_rows()).len(), 3);
    }

    #[test]
    fn test_filter_keeps_requested_match() {
        let options = ExportOptions {
            match_id: Some("1".to_string()),
            from: NaiveDate::from_ymd_opt(2024, 4, 1),
            ..ExportOptions::default()
        };

        // Match reports are not cut by the date range.
        let kept = options.filter(ExportKind::Match, team_rows());
        assert_eq!(kept.iter().map(|l| l.kills).collect::<Vec<_>>(), vec![3, 7]);
    }

    #[test]
    fn test_query_shares_one_projection() {
        let options = ExportOptions {
            player_id: Some("p1".to_string()),
            match_id: Some("1".to_string()),
            ..ExportOptions::default()
        };
        let team = options.query(ExportKind::Team).unwrap();

        assert!(!team.narrows_rows());
        for kind in [ExportKind::Player, ExportKind::Match] {
            assert_eq!(options.query(kind).unwrap().select, team.select);
        }
        assert!(team.select.unwrap().starts_with("playerId,matches("));
    }

    #[test]
    fn test_render_html() {
        let rows = lines();
        let summary = TeamSummary::calculate(&rows);
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let html = render_html(ExportKind::Team, &rows, &summary, date);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Team Performance Report</h1>"));
        assert!(html.contains("<p>Generated on 2024-03-09</p>"));
        assert!(html.contains("Wins: 1"));
        assert!(html.contains("<th>Opponent</th>"));
        assert!(html.contains("<td>Ana Lee</td>"));
        assert_eq!(escape("<b>\"Tom & Jo\"</b>"), "&lt;b&gt;&quot;Tom &amp; Jo&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_export_report_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let csv = export_report(ExportKind::Team, ReportFormat::Csv, &lines(), temp_dir.path(), date)
            .unwrap();
        assert_eq!(csv.file_name().unwrap(), "team_stats_2024-03-09.csv");
        assert_eq!(std::fs::read_to_string(csv).unwrap().lines().count(), 3);

        let html =
            export_report(ExportKind::Match, ReportFormat::Html, &lines(), temp_dir.path(), date)
                .unwrap();
        assert_eq!(html.file_name().unwrap(), "match_report_2024-03-09.html");
        assert!(std::fs::read_to_string(html)
            .unwrap()
            .contains("<h1>Match Report</h1>"));
    }
}
