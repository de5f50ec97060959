use bevy::prelude::*;

use crate::style::{DEPTH_COLORS, DEPTH_THRESHOLDS, DepthColor};

pub(crate) fn legend_plugin(app: &mut App) {
    app.init_resource::<Legend>()
        .add_systems(Startup, spawn_legend_panel);
}

/// One swatch of the depth legend.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub color: DepthColor,
    pub label: String,
}

/// Depth legend built from parallel threshold and color tables.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct Legend {
    entries: Vec<LegendEntry>,
}

impl Default for Legend {
    fn default() -> Self {
        Self::new(&DEPTH_THRESHOLDS, &DEPTH_COLORS)
    }
}

impl Legend {
    /// Pairs each threshold with the color at the same index. Labels read `lower–upper`,
    /// and the last one `lower+`. Extra colors beyond the thresholds are ignored.
    pub fn new(thresholds: &[f64], colors: &[DepthColor]) -> Self {
        let entries = thresholds
            .iter()
            .zip(colors)
            .enumerate()
            .map(|(i, (lower, color))| {
                let label = match thresholds.get(i + 1) {
                    Some(upper) => format!("{lower}\u{2013}{upper}"),
                    None => format!("{lower}+"),
                };
                LegendEntry {
                    color: *color,
                    label,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    /// HTML fragment with one `<i>` swatch per bucket, suitable for an `info legend` div.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        let last = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter().enumerate() {
            html.push_str(&format!(
                "<i style=\"background:{}\"></i> {}",
                entry.color.to_hex(),
                entry.label.replace('\u{2013}', "&ndash;")
            ));
            if i != last {
                html.push_str("<br>");
            }
        }
        html
    }
}

#[derive(Component, Debug)]
pub struct LegendPanel;

const SWATCH_SIZE: f32 = 14.0;

fn spawn_legend_panel(mut commands: Commands, legend: Res<Legend>) {
    commands
        .spawn((
            LegendPanel,
            Node {
                position_type: PositionType::Absolute,
                right: Val::Px(10.0),
                bottom: Val::Px(24.0),
                flex_direction: FlexDirection::Column,
                padding: UiRect::all(Val::Px(6.0)),
                row_gap: Val::Px(2.0),
                ..default()
            },
            BackgroundColor(Color::srgba(1.0, 1.0, 1.0, 0.8)),
        ))
        .with_children(|panel| {
            for entry in legend.entries() {
                panel
                    .spawn(Node {
                        flex_direction: FlexDirection::Row,
                        align_items: AlignItems::Center,
                        column_gap: Val::Px(6.0),
                        ..default()
                    })
                    .with_children(|row| {
                        row.spawn((
                            Node {
                                width: Val::Px(SWATCH_SIZE),
                                height: Val::Px(SWATCH_SIZE),
                                ..default()
                            },
                            BackgroundColor(entry.color.into()),
                        ));
                        row.spawn((
                            Text::new(entry.label.clone()),
                            TextFont {
                                font_size: 12.0,
                                ..default()
                            },
                            TextColor(Color::srgb(0.33, 0.33, 0.33)),
                        ));
                    });
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_from_depth_tables() {
        let legend = Legend::new(&[0.0, 10.0, 30.0, 50.0, 70.0, 90.0], &DEPTH_COLORS);
        let labels: Vec<_> = legend.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["0–10", "10–30", "30–50", "50–70", "70–90", "90+"]);
        assert_eq!(legend.entries()[5].color, DEPTH_COLORS[5]);
    }

    #[test]
    fn html_fragment() {
        let html = Legend::default().to_html();
        assert_eq!(html.matches("<i style=").count(), 6);
        assert!(html.starts_with("<i style=\"background:#98ee00\"></i> 0&ndash;10<br>"));
        assert!(html.ends_with("<i style=\"background:#ea2c2c\"></i> 90+"));
    }

    #[test]
    fn mismatched_tables_use_shorter() {
        let legend = Legend::new(&[0.0, 10.0, 30.0], &DEPTH_COLORS[..2]);
        assert_eq!(legend.entries().len(), 2);
        assert_eq!(legend.entries()[1].label, "10–30");
    }
}
