/// A fixed instruction sent alongside one screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub instruction: &'static str,
    pub max_tokens: u32,
}

/// Main detail screen: species, individual data, moves, trainer.
pub const DETAIL_TEMPLATE: Template = Template {
    name: "detail",
    max_tokens: 512,
    instruction: r#"You are looking at a Pokemon HOME detail screen for a single Pokemon.
Extract every visible piece of information and return it as JSON.

Return ONLY valid JSON with these exact keys (use null for any field not visible):

{
  "species_name": "Pikachu",
  "dex_number": 25,
  "form_name": null,
  "nickname": null,
  "level": 50,
  "nature": "Timid",
  "ability": "Static",
  "is_shiny": false,
  "gender": "male",
  "held_item": null,
  "mark": null,
  "iv_hp": null,
  "iv_atk": null,
  "iv_def": null,
  "iv_spatk": null,
  "iv_spdef": null,
  "iv_speed": null,
  "ev_hp": null,
  "ev_atk": null,
  "ev_def": null,
  "ev_spatk": null,
  "ev_spdef": null,
  "ev_speed": null,
  "move1": "Thunderbolt",
  "move2": "Volt Switch",
  "move3": "Grass Knot",
  "move4": "Protect",
  "original_trainer": "Red",
  "trainer_id": "12345",
  "game_of_origin": null,
  "ball_type": "Poke Ball"
}

Rules:
- is_shiny is true only when the shiny star indicator is shown near the top-right.
- gender is "male", "female" or "unknown".
- nickname only when the Pokemon has a custom name different from the species name.
- IVs and EVs only when numbers are visible on this screen, otherwise null.
- Return ONLY the JSON object, no markdown, no explanation."#,
};

/// Scrolled-down half of the detail screen: where and when the Pokemon was met.
pub const CAUGHT_INFO_TEMPLATE: Template = Template {
    name: "caught-info",
    max_tokens: 256,
    instruction: r#"You are looking at the scrolled-down part of a Pokemon HOME detail screen.
Extract the caught/met information and return it as JSON.

Return ONLY valid JSON with these exact keys (use null for any field not visible):

{
  "date_caught": "2023-04-01",
  "met_at_level": 1,
  "met_at_location": "Mesagoza"
}

Rules:
- date_caught uses YYYY-MM-DD when visible, otherwise null.
- met_at_level is the integer level at which the Pokemon was met or received.
- met_at_location is the location name as shown (for example "Link Trade" or "Pokemon HOME").
- Return ONLY the JSON object, no markdown, no explanation."#,
};
