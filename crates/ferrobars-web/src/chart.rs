//! SVG line chart of closes with their EMA overlays.

use ferrobars_core::{PriceBar, STORED_EMA_WINDOWS};

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 540.0;
const MARGIN_LEFT: f64 = 72.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 48.0;
const MARGIN_BOTTOM: f64 = 48.0;
const GRID_LINES: usize = 5;

const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];

struct Series {
    label: String,
    points: Vec<(i64, f64)>,
}

/// Render `bars` (ascending) as an SVG document titled
/// `"{symbol} — Close with EMAs"`.
///
/// One line is drawn for the close and one per stored EMA column that has
/// at least one value in the window.
pub fn render_close_with_emas(symbol: &str, bars: &[PriceBar]) -> String {
    let series = collect_series(bars);
    let title = format!("{symbol} — Close with EMAs");

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    svg.push_str(&format!(
        r#"<rect width="{WIDTH}" height="{HEIGHT}" fill="white"/><text x="{}" y="28" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape(&title)
    ));

    let Some(bounds) = Bounds::of(&series) else {
        svg.push_str("</svg>");
        return svg;
    };

    push_axes(&mut svg, &bounds, bars);

    for (index, line) in series.iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        let points = line
            .points
            .iter()
            .map(|(x, y)| format!("{:.2},{:.2}", bounds.x(*x), bounds.y(*y)))
            .collect::<Vec<_>>()
            .join(" ");
        svg.push_str(&format!(
            r#"<polyline fill="none" stroke="{color}" stroke-width="1.5" points="{points}"/>"#
        ));
    }

    push_legend(&mut svg, &series);
    svg.push_str("</svg>");
    svg
}

fn collect_series(bars: &[PriceBar]) -> Vec<Series> {
    let mut series = vec![Series {
        label: String::from("Close"),
        points: bars
            .iter()
            .map(|bar| (epoch(bar), bar.close))
            .collect(),
    }];

    for window in STORED_EMA_WINDOWS {
        let points = bars
            .iter()
            .filter_map(|bar| bar.ema(window).map(|value| (epoch(bar), value)))
            .collect::<Vec<_>>();
        if !points.is_empty() {
            series.push(Series {
                label: format!("EMA{window}"),
                points,
            });
        }
    }

    series.retain(|line| !line.points.is_empty());
    series
}

fn epoch(bar: &PriceBar) -> i64 {
    bar.timestamp.assume_utc().unix_timestamp()
}

struct Bounds {
    min_x: i64,
    max_x: i64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn of(series: &[Series]) -> Option<Self> {
        let points = series.iter().flat_map(|line| line.points.iter());
        let mut bounds: Option<Self> = None;
        for (x, y) in points.filter(|(_, y)| y.is_finite()) {
            let current = bounds.get_or_insert(Self {
                min_x: *x,
                max_x: *x,
                min_y: *y,
                max_y: *y,
            });
            current.min_x = current.min_x.min(*x);
            current.max_x = current.max_x.max(*x);
            current.min_y = current.min_y.min(*y);
            current.max_y = current.max_y.max(*y);
        }

        // Pad the price range so flat series still get a visible band.
        bounds.map(|mut bounds| {
            let pad = ((bounds.max_y - bounds.min_y) * 0.05).max(bounds.max_y.abs() * 0.01).max(0.01);
            bounds.min_y -= pad;
            bounds.max_y += pad;
            bounds
        })
    }

    fn x(&self, x: i64) -> f64 {
        let plot = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        if self.max_x == self.min_x {
            return MARGIN_LEFT + plot / 2.0;
        }
        MARGIN_LEFT + (x - self.min_x) as f64 / (self.max_x - self.min_x) as f64 * plot
    }

    fn y(&self, y: f64) -> f64 {
        let plot = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + (self.max_y - y) / (self.max_y - self.min_y) * plot
    }
}

fn push_axes(svg: &mut String, bounds: &Bounds, bars: &[PriceBar]) {
    let left = MARGIN_LEFT;
    let right = WIDTH - MARGIN_RIGHT;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    for step in 0..=GRID_LINES {
        let value = bounds.min_y + (bounds.max_y - bounds.min_y) * step as f64 / GRID_LINES as f64;
        let y = bounds.y(value);
        svg.push_str(&format!(
            r##"<line x1="{left}" y1="{y:.2}" x2="{right}" y2="{y:.2}" stroke="#e0e0e0"/><text x="{:.2}" y="{:.2}" text-anchor="end">{value:.2}</text>"##,
            left - 6.0,
            y + 4.0
        ));
    }
    svg.push_str(&format!(
        r##"<line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="#333"/><line x1="{left}" y1="{MARGIN_TOP}" x2="{left}" y2="{bottom}" stroke="#333"/>"##
    ));

    let mut ticks = vec![bars.first(), bars.get(bars.len() / 2), bars.last()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    ticks.dedup_by_key(|bar| bar.timestamp);
    for bar in ticks {
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle">{}</text>"#,
            bounds.x(epoch(bar)),
            bottom + 18.0,
            bar.timestamp.date()
        ));
    }
}

fn push_legend(svg: &mut String, series: &[Series]) {
    for (index, line) in series.iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        let y = MARGIN_TOP + 14.0 + index as f64 * 18.0;
        let x = MARGIN_LEFT + 12.0;
        svg.push_str(&format!(
            r#"<line x1="{x}" y1="{y}" x2="{}" y2="{y}" stroke="{color}" stroke-width="2"/><text x="{}" y="{}">{}</text>"#,
            x + 20.0,
            x + 26.0,
            y + 4.0,
            escape(&line.label)
        ));
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
