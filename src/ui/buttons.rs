use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "player_pause";
    pub const RESUME: &str = "player_resume";
    pub const SKIP: &str = "player_skip";
    pub const STOP: &str = "player_stop";
}

/// Controles bajo el mensaje de "Reproduciendo Ahora"
pub fn create_player_buttons() -> Vec<CreateActionRow> {
    let pause_btn = CreateButton::new(button_ids::PAUSE)
        .emoji('⏸')
        .style(ButtonStyle::Secondary);

    let resume_btn = CreateButton::new(button_ids::RESUME)
        .emoji('▶')
        .style(ButtonStyle::Secondary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![
        pause_btn, resume_btn, skip_btn, stop_btn,
    ])]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_player_button_ids() {
        let rows = serde_json::to_value(create_player_buttons()).unwrap();
        let ids: Vec<&str> = rows[0]["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["custom_id"].as_str().unwrap())
            .collect();

        assert_eq!(
            ids,
            vec![
                button_ids::PAUSE,
                button_ids::RESUME,
                button_ids::SKIP,
                button_ids::STOP
            ]
        );
    }
}
