use crate::data::Speaker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelEvent {
    Select(i32),
    Deselect(i32),
}

/// The single selected cluster, or none. Owned by the panel; every mutation
/// goes through `toggle` so the host sees each transition as explicit events
/// instead of side effects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<i32>,
}

impl SelectionState {
    pub fn selected(&self) -> Option<i32> {
        self.selected
    }

    pub fn is_selected(&self, cluster_id: i32) -> bool {
        self.selected == Some(cluster_id)
    }

    /// Clicking a cluster button. Selecting over an existing selection
    /// deselects the old one first; clicking the selected cluster clears it.
    pub fn toggle(&mut self, cluster_id: i32) -> Vec<PanelEvent> {
        match self.selected {
            Some(current) if current == cluster_id => {
                self.selected = None;
                vec![PanelEvent::Deselect(current)]
            }
            Some(current) => {
                self.selected = Some(cluster_id);
                vec![PanelEvent::Deselect(current), PanelEvent::Select(cluster_id)]
            }
            None => {
                self.selected = Some(cluster_id);
                vec![PanelEvent::Select(cluster_id)]
            }
        }
    }

    /// Drop any selection, e.g. when a new dataset replaces the old clusters.
    pub fn clear(&mut self) -> Option<PanelEvent> {
        self.selected.take().map(PanelEvent::Deselect)
    }
}

/// Read-only table for the detail pane: a title row, column headers, and
/// pre-formatted cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableModel {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn make_table<T>(
    title: &str,
    columns: &[&str],
    items: &[T],
    row: impl Fn(usize, &T) -> Vec<String>,
) -> TableModel {
    TableModel {
        title: title.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: items
            .iter()
            .enumerate()
            .map(|(i, item)| row(i, item))
            .collect(),
    }
}

pub fn journal_table(journals: &[String]) -> TableModel {
    make_table("Top journals", &["Rank", "Name"], journals, |i, journal| {
        vec![(i + 1).to_string(), journal.clone()]
    })
}

pub fn speaker_table(speakers: &[Speaker]) -> TableModel {
    make_table(
        "Top quotes",
        &["%", "Speakers", "Description"],
        speakers,
        |_, s| {
            vec![
                format!("{:.2}", 100.0 * s.share),
                s.name.clone(),
                s.title.clone(),
            ]
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_then_toggle_off() {
        let mut state = SelectionState::default();
        assert_eq!(state.toggle(3), vec![PanelEvent::Select(3)]);
        assert_eq!(state.selected(), Some(3));
        assert_eq!(state.toggle(3), vec![PanelEvent::Deselect(3)]);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn switching_selection_deselects_previous_exactly_once() {
        let mut state = SelectionState::default();
        state.toggle(3);
        let events = state.toggle(5);
        assert_eq!(
            events,
            vec![PanelEvent::Deselect(3), PanelEvent::Select(5)]
        );
        assert_eq!(state.selected(), Some(5));
        let deselects_of_3 = events
            .iter()
            .filter(|e| **e == PanelEvent::Deselect(3))
            .count();
        assert_eq!(deselects_of_3, 1);
    }

    #[test]
    fn clear_reports_the_dropped_selection() {
        let mut state = SelectionState::default();
        assert_eq!(state.clear(), None);
        state.toggle(-1);
        assert_eq!(state.clear(), Some(PanelEvent::Deselect(-1)));
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn journal_table_rows_are_ranked_in_order() {
        let table = journal_table(&["A".to_string(), "B".to_string()]);
        assert_eq!(table.columns, vec!["Rank", "Name"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1".to_string(), "A".to_string()],
                vec!["2".to_string(), "B".to_string()],
            ]
        );
    }

    #[test]
    fn speaker_table_formats_share_as_percent() {
        let speakers = vec![Speaker {
            name: "X".to_string(),
            title: "mayor".to_string(),
            share: 0.1234,
        }];
        let table = speaker_table(&speakers);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "12.34");
        assert_eq!(table.rows[0][1], "X");
        assert_eq!(table.rows[0][2], "mayor");
    }

    #[test]
    fn empty_items_yield_empty_table() {
        assert!(journal_table(&[]).rows.is_empty());
        assert!(speaker_table(&[]).rows.is_empty());
    }
}
