//! The bundled starter adventure.

use std::sync::Arc;

use super::{
    AdventureModule, AttackBlock, Container, DamageType, DialogueLine, Disposition, Encounter,
    EncounterEnemyRef, ItemDef, Light, Lock, ModuleRules, Npc, NpcId, Objective, Room, Secret,
    StatBlock,
};
use crate::character::Skill;

const NIMBLE_ESCAPE: &str = "Nimble Escape: Disengage or Hide as a bonus action";

fn goblin_guard() -> StatBlock {
    StatBlock::new(15, 7)
        .with_attack(AttackBlock::new("Scimitar", 4, "1d6+2", DamageType::Slashing))
        .with_attack(AttackBlock::new("Shortbow", 4, "1d6+2", DamageType::Piercing))
        .with_skill(Skill::Stealth, 6)
        .with_skill(Skill::Perception, 2)
        .with_trait(NIMBLE_ESCAPE)
}

fn wolf() -> StatBlock {
    StatBlock::new(13, 11)
        .with_attack(AttackBlock::new("Bite", 4, "2d4+2", DamageType::Piercing))
        .with_skill(Skill::Perception, 3)
        .with_skill(Skill::Stealth, 4)
        .with_trait("Pack Tactics: Advantage on attacks if ally is within 5 ft of target")
}

/// A short level 1-2 crawl: five rooms, three fights, one nervous goblin.
pub fn goblin_cave() -> AdventureModule {
    let guard = Arc::new(goblin_guard());

    let lookout = {
        let mut stats = goblin_guard();
        stats.ac = 14;
        stats.hp = 5;
        stats.skills.insert(Skill::Perception, 4);
        Arc::new(stats)
    };
    let handler = {
        let mut stats = goblin_guard();
        stats.hp = 9;
        stats.attacks = vec![AttackBlock::new("Club", 4, "1d4+2", DamageType::Bludgeoning)];
        Arc::new(stats)
    };
    let dozer = {
        let mut stats = goblin_guard();
        stats.hp = 5;
        Arc::new(stats)
    };

    let items = vec![
        ItemDef::new(
            "stone-key",
            "Notched Stone Key",
            "A palm-sized key carved from riverstone with crude goblin runes.",
        ),
        ItemDef::new(
            "torch-bundle",
            "Bundle of Torches",
            "Six pitch-soaked torches wrapped in twine.",
        ),
        ItemDef::new(
            "rations-goblin",
            "Goblin Rations",
            "Dried fish, sour mushrooms, and hard cakes. Edible, barely.",
        ),
        ItemDef::new(
            "dagger-plus1",
            "Dagger, +1",
            "A well-balanced blade with a dull sheen that catches the eye.",
        )
        .worth(300),
    ];

    let containers = vec![Container {
        id: "chest-01".to_string(),
        name: "Sturdy Wooden Chest".to_string(),
        description: "Iron-banded chest tucked in a niche with scuffed stone around it."
            .to_string(),
        lock: Some(Lock {
            key: Some("stone-key".to_string()),
            pick_dc: Some(15),
            force_dc: Some(14),
        }),
        contents: vec!["50 gp".to_string(), "dagger-plus1".to_string()],
    }];

    let npcs = vec![Npc {
        id: NpcId::new("snikk"),
        name: "Snikk".to_string(),
        role: "cowardly goblin lookout".to_string(),
        disposition: Disposition::Wary,
        motivations: vec![
            "Avoid pain".to_string(),
            "Trade junk for safety".to_string(),
            "Impress the boss".to_string(),
        ],
        dialogue: vec![
            DialogueLine {
                cue: "threaten".to_string(),
                line: "No stab Snikk. Snikk talks. Boss hates torches.".to_string(),
            },
            DialogueLine {
                cue: "bribe".to_string(),
                line: "Shiny for a secret? Chest key is round and cold. Snikk saw stone teeth by the pool.".to_string(),
            },
            DialogueLine {
                cue: "ask-way".to_string(),
                line: "Left then down. Hear drips? That way. But gobbos wait.".to_string(),
            },
        ],
        stats: Some(Arc::new(
            StatBlock::new(13, 7)
                .with_attack(AttackBlock::new("Shortsword", 4, "1d6+2", DamageType::Slashing))
                .with_skill(Skill::Stealth, 6)
                .with_skill(Skill::Perception, 2)
                .with_trait(NIMBLE_ESCAPE),
        )),
    }];

    let encounters = vec![
        Encounter::new(
            "ambush-antechamber",
            "Goblin Ambush",
            "Two goblin guards lurk behind jagged rocks while a third watches from a ledge.",
        )
        .with_enemy(EncounterEnemyRef::new("Goblin Guard", guard.clone()).times(2))
        .with_enemy(EncounterEnemyRef::new("Goblin Lookout", lookout))
        .with_tactics(
            "They snipe with shortbows then fall back toward the main chamber, using Nimble Escape to avoid melee.",
        )
        .with_stealth_avoid_dc(13),
        Encounter::new(
            "kennel-fray",
            "Wolf Kennel",
            "A tethered wolf snarls near a pile of bones; a goblin handler prods it with a stick.",
        )
        .with_enemy(EncounterEnemyRef::new("Wolf", Arc::new(wolf())))
        .with_enemy(EncounterEnemyRef::new("Goblin Handler", handler))
        .with_tactics("Handler commands the wolf to drag foes prone while he retreats and yells for help.")
        .with_stealth_avoid_dc(12)
        .with_treasure(["rations-goblin"]),
        Encounter::new(
            "guard-post",
            "Main Chamber Guard Post",
            "A cook fire smolders. Two goblins play knucklebones while a third naps.",
        )
        .with_enemy(EncounterEnemyRef::new("Goblin Guard", guard).times(2))
        .with_enemy(EncounterEnemyRef::new("Goblin Dozer", dozer))
        .with_tactics(
            "If alerted by noise from the antechamber, they take positions behind stalagmites and focus fire on the least armored target.",
        )
        .with_stealth_avoid_dc(11)
        .with_treasure(["stone-key"]),
    ];

    let rooms = vec![
        Room::new(
            "entrance",
            "Cave Mouth",
            "A jagged cleft in a low cliff opens into cool darkness. Damp air carries the smell of smoke and wet fur.",
        )
        .with_light(Light::Dim)
        .with_ambient("Distant drips and the faint clatter of stone on stone.")
        .with_exit("east", "antechamber")
        .with_secret(
            Secret::new("Fresh goblin tracks lead inward; smaller bare prints suggest a wolf pup once roamed here.")
                .gated(Skill::Survival, 10),
        ),
        Room::new(
            "antechamber",
            "Shadowed Antechamber",
            "Jagged rocks form natural cover and narrow lanes. A soot smear stains the ceiling.",
        )
        .with_light(Light::Dark)
        .with_ambient("A breath of cold air brushes your cheeks when you move.")
        .with_exit("west", "entrance")
        .with_exit("southeast", "main-chamber")
        .with_encounter("ambush-antechamber")
        .with_stealth_dc(13)
        .with_secret(
            Secret::new("Loose stones can be nudged to create a distraction in the southeast passage.")
                .gated(Skill::SleightOfHand, 12),
        ),
        Room::new(
            "main-chamber",
            "Main Chamber",
            "A broad cavern with a low fire pit, stacked crates, and a rope leading up to a rickety ledge.",
        )
        .with_light(Light::Dim)
        .with_ambient("The crackle of embers, the rustle of sacks, and occasional goblin chatter.")
        .with_exit("northwest", "antechamber")
        .with_exit("east", "kennel")
        .with_exit("south", "treasure-hall")
        .with_encounter("guard-post")
        .with_secret(
            Secret::new("A stone carving of jagged teeth near the rope marks the boss's personal stash.")
                .gated(Skill::Investigation, 12),
        ),
        Room::new(
            "kennel",
            "Wolf Kennel",
            "A side chamber reeking of musky fur. A crude fence and a frayed rope tether sit near a heap of bones.",
        )
        .with_light(Light::Dark)
        .with_ambient("Low growls and the scrape of claws on stone.")
        .with_exit("west", "main-chamber")
        .with_encounter("kennel-fray")
        .with_items(["rations-goblin"]),
        Room::new(
            "treasure-hall",
            "Boss's Hoard Niche",
            "A narrow hall opens into a niche where an iron-banded chest rests on stacked slate.",
        )
        .with_light(Light::Dark)
        .with_ambient("Water drops tick into a shallow pool that reflects a faint gleam from metal fittings.")
        .with_exit("north", "main-chamber")
        .with_items(["chest-01"])
        .with_secret(
            Secret::new("A notched stone keyhole sits under the front lip of the slate pedestal.")
                .gated(Skill::Perception, 11),
        ),
    ];

    let objectives = vec![
        Objective::new("clear-goblins", "Drive off or defeat the goblins.")
            .done_if("No hostile goblins remain in main-chamber or antechamber."),
        Objective::new("recover-treasure", "Recover what the goblin boss stole.")
            .done_if("Chest chest-01 opened or its contents claimed."),
        Objective::new("spare-snikk", "Resolve Snikk's presence without killing him.")
            .done_if("Snikk is not hostile at module end and is alive or has fled."),
    ];

    AdventureModule {
        id: "goblin-cave".to_string(),
        title: "Goblin Cave".to_string(),
        summary: "A short crawl ideal for level 1 groups. Skulk past goblin sentries, bargain with a cowardly lookout, calm a hungry wolf, and crack the boss's chest.".to_string(),
        level_range: (1, 2),
        rooms,
        encounters,
        npcs,
        containers,
        items,
        objectives,
        rules: Some(ModuleRules {
            stealth: Some(
                "If the party's group Stealth beats a room's stealth DC or the encounter's stealth-avoid DC, they can bypass or gain advantage on the first round.".to_string(),
            ),
            negotiation: Some(
                "Offer rations or coin to adjust Snikk's disposition. A DC 12 Persuasion can turn him neutral; a DC 14 with a small bribe turns him friendly.".to_string(),
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adventure::{validate, RoomId};

    #[test]
    fn test_goblin_cave_validates() {
        let module = goblin_cave();
        assert_eq!(validate(&module), Vec::<String>::new());
        assert!(module.unreachable_rooms().is_empty());
    }

    #[test]
    fn test_goblin_cave_traversal_order() {
        let module = goblin_cave();
        let order: Vec<String> = module
            .traverse(&RoomId::new("entrance"))
            .into_iter()
            .map(|r| r.0)
            .collect();
        assert_eq!(
            order,
            vec!["entrance", "antechamber", "main-chamber", "kennel", "treasure-hall"]
        );
    }

    #[test]
    fn test_shared_templates_are_not_copied() {
        let module = goblin_cave();
        let ambush = &module.encounters[0];
        let post = &module.encounters[2];
        assert!(Arc::ptr_eq(&ambush.enemies[0].stats, &post.enemies[0].stats));
        assert_eq!(ambush.enemy_count(), 3);
    }

    #[test]
    fn test_module_serializes() {
        let json = serde_json::to_string(&goblin_cave()).unwrap();
        let back: AdventureModule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rooms.len(), 5);
        assert_eq!(back.encounters[1].enemies[1].stats.hp, 9);
    }
}
