use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption},
};

use crate::audio::{
    queue::QueuePage,
    track::{format_duration, Track},
};

/// IDs personalizados para los componentes
pub mod component_ids {
    /// Prefix of the queue navigation buttons; the target page follows.
    pub const QUEUE_PAGE: &str = "queue_page:";
    pub const QUEUE_PAGE_INFO: &str = "queue_page_info";
    pub const SEARCH_SELECTION: &str = "search_selection";
}

/// Límite de Discord para etiquetas del menú
const LABEL_LIMIT: usize = 100;

/// Acción solicitada por un componente
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentAction {
    QueuePage(i64),
    SearchSelection,
}

impl ComponentAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        if custom_id == component_ids::SEARCH_SELECTION {
            return Some(ComponentAction::SearchSelection);
        }
        custom_id
            .strip_prefix(component_ids::QUEUE_PAGE)?
            .parse()
            .ok()
            .map(ComponentAction::QueuePage)
    }
}

/// Botones anterior/siguiente de la cola; las páginas dan la vuelta
pub fn queue_navigation(page: &QueuePage) -> Option<CreateActionRow> {
    if page.total_pages <= 1 {
        return None;
    }
    let current = page.current_page as i64;

    let prev_btn = CreateButton::new(format!("{}{}", component_ids::QUEUE_PAGE, current - 1))
        .emoji('◀')
        .style(ButtonStyle::Primary);

    let page_btn = CreateButton::new(component_ids::QUEUE_PAGE_INFO)
        .label(format!("{}/{}", page.current_page, page.total_pages))
        .style(ButtonStyle::Secondary)
        .disabled(true);

    let next_btn = CreateButton::new(format!("{}{}", component_ids::QUEUE_PAGE, current + 1))
        .emoji('▶')
        .style(ButtonStyle::Primary);

    Some(CreateActionRow::Buttons(vec![prev_btn, page_btn, next_btn]))
}

/// Etiqueta del menú con la duración, recortada al límite de Discord
fn option_label(track: &Track) -> String {
    let label = format!("{} [{}]", track.title(), format_duration(track.duration()));
    if label.chars().count() > LABEL_LIMIT {
        let truncated: String = label.chars().take(LABEL_LIMIT - 3).collect();
        format!("{}...", truncated)
    } else {
        label
    }
}

/// Crea menú de selección para los resultados de búsqueda
///
/// Each option carries the video URL, so picking one resolves it again
/// instead of keeping per-user search state.
pub fn search_menu(results: &[Track]) -> CreateSelectMenu {
    let options = results
        .iter()
        .filter_map(|track| {
            let url = track.video_url()?;
            Some(CreateSelectMenuOption::new(option_label(track), url).description(track.kind().as_str()))
        })
        .collect();

    CreateSelectMenu::new(component_ids::SEARCH_SELECTION, CreateSelectMenuKind::String { options })
        .placeholder("Selecciona una canción para reproducir...")
        .min_values(1)
        .max_values(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_component_ids() {
        assert_eq!(ComponentAction::parse("queue_page:3"), Some(ComponentAction::QueuePage(3)));
        assert_eq!(ComponentAction::parse("queue_page:0"), Some(ComponentAction::QueuePage(0)));
        assert_eq!(ComponentAction::parse("search_selection"), Some(ComponentAction::SearchSelection));
        assert_eq!(ComponentAction::parse("queue_page:x"), None);
        assert_eq!(ComponentAction::parse("queue_page_info"), None);
    }

    #[test]
    fn long_labels_are_truncated() {
        let track = Track::youtube("ñ".repeat(150), "https://www.youtube.com/watch?v=a", Duration::from_secs(61));
        let label = option_label(&track);
        assert_eq!(label.chars().count(), LABEL_LIMIT);
        assert!(label.ends_with("..."));

        let short = Track::youtube("lofi", "https://www.youtube.com/watch?v=b", Duration::from_secs(61));
        assert_eq!(option_label(&short), "lofi [1:01]");
    }
}
