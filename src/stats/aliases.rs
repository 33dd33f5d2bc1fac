//! Alternate spellings of stat paths.
//!
//! Stat names have been renamed across data-source revisions. Metric
//! definitions keep using the current name, and lookups fall back to every
//! older spelling listed here. Keys and aliases are matched exactly.

/// Namespace prepended to both category and stat when a bare lookup misses.
pub const NAMESPACE_PREFIX: &str = "minecraft:";

const ALIASES: &[(&str, &[&str])] = &[
    ("custom.play_time", &["custom.play_one_minute", "custom.playOneMinute"]),
    ("custom.walk_one_cm", &["custom.walk_cm", "custom.walkOneCm"]),
    ("custom.sprint_one_cm", &["custom.sprint_cm", "custom.sprintOneCm"]),
    ("custom.swim_one_cm", &["custom.swim_cm", "custom.swimOneCm"]),
    ("custom.fly_one_cm", &["custom.fly_cm", "custom.flyOneCm"]),
    ("custom.boat_one_cm", &["custom.boat_cm", "custom.boatOneCm"]),
    ("custom.deaths", &["custom.death_count", "custom.deathCount"]),
    ("custom.mob_kills", &["custom.mobs_killed", "custom.mobKills"]),
    ("custom.player_kills", &["custom.players_killed", "custom.playerKills"]),
    ("custom.damage_dealt", &["custom.damageDealt"]),
    ("custom.fish_caught", &["custom.fishCaught"]),
    ("custom.animals_bred", &["custom.animalsBred"]),
    ("custom.traded_with_villager", &["custom.tradedWithVillager"]),
    ("custom.time_since_death", &["custom.timeSinceDeath"]),
];

/// Older spellings registered for `path`, in lookup order.
pub fn aliases_for(path: &str) -> &'static [&'static str] {
    ALIASES
        .iter()
        .find(|(canonical, _)| *canonical == path)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}
