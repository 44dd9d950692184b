//! A short walk through a tavern scene: entities, passages, saving and
//! loading.
//!
//! Run with `cargo run --example tavern`.

use narrative_state::core::context::{ContextError, GameContext};
use narrative_state::core::display::{Displayable, Dynamic};
use narrative_state::core::passage::{Hotspot, MapPassage, StoryPassage, WidgetPassage};
use narrative_state::core::reactive::Field;
use narrative_state::schema::content::StoryComponent;
use narrative_state::schema::save::SaveMeta;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), ContextError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut ctx = GameContext::builder().version("0.1.0").build()?;

    let player = ctx.spawn_entity("player")?;
    player.set("gold", 12)?;
    player.set("hp", json!({ "cur": 10, "max": 10 }))?;
    player.set("inventory", json!(["dagger"]))?;
    ctx.capture_initial_state()?;

    let narrator = player.clone();
    ctx.passages_mut()
        .register(StoryPassage::new("bar", move || {
            narrator.update("visits", |v| json!(v.and_then(|f| f.as_i64()).unwrap_or(0) + 1))?;
            let visits = narrator.get_as::<i64>("visits").unwrap_or(0);
            let gold = narrator.get_as::<i64>("gold").unwrap_or(0);
            Ok(vec![
                StoryComponent::header("The Crooked Tankard", 1),
                StoryComponent::text(format!("Visit {visits}. You have {gold} gold.")),
                StoryComponent::link("Look around", "tavern_map"),
            ])
        }))?;

    let buyer = player.clone();
    ctx.passages_mut()
        .register(MapPassage::new("tavern_map", "tavern.png", move || {
            let buyer = buyer.clone();
            Ok(vec![
                Hotspot::new("barkeep", 40.0, 55.0)
                    .label("Barkeep")
                    .target("bar"),
                Hotspot::new("ale", 62.0, 48.0)
                    .label("Buy ale (3 gold)")
                    .disabled(Dynamic::computed(move || {
                        buyer.get_as::<i64>("gold").unwrap_or(0) < 3
                    })),
            ])
        }))?;

    let watcher = player.clone();
    ctx.passages_mut()
        .register(WidgetPassage::new("status", move || {
            let hp = watcher
                .get("hp")
                .and_then(Field::into_proxy)
                .and_then(|hp| hp.get_as::<i64>("cur"))
                .unwrap_or(0);
            vec![StoryComponent::text(format!("HP {hp}"))]
        }))?;

    show_bar(&mut ctx)?;

    // Drink, get hurt in a brawl, pick up a mug.
    player.update("gold", |v| json!(v.and_then(|f| f.as_i64()).unwrap_or(0) - 3))?;
    if let Some(hp) = player.get("hp").and_then(Field::into_proxy) {
        hp.set("cur", 6)?;
    }
    if let Some(inventory) = player.get("inventory").and_then(Field::into_proxy) {
        inventory.push("mug")?;
    }

    let map = ctx.passages_mut().map_mut("tavern_map")?.display()?;
    for hotspot in &map.hotspots {
        println!(
            "  [{}] {}{}",
            hotspot.id,
            hotspot.label.as_deref().unwrap_or("?"),
            if hotspot.disabled { " (disabled)" } else { "" }
        );
    }

    ctx.save_game("after brawl", SaveMeta::described("Bruised but wiser"))?;

    player.set("gold", 0)?;
    ctx.load_game("after brawl")?;
    println!("Reloaded: {}", json!(player.variables()));

    let status = ctx.passages_mut().widget_mut("status")?.display()?;
    println!("Status widget: {:?}", status.force());

    ctx.new_game()?;
    println!("New game: {}", json!(player.variables()));
    show_bar(&mut ctx)?;

    for save in ctx.saves().list_saves()? {
        println!("Save '{}' v{}", save.name, save.version);
    }
    Ok(())
}

fn show_bar(ctx: &mut GameContext) -> Result<(), ContextError> {
    let bar = ctx.passages_mut().story_mut("bar")?;
    for component in bar.display()? {
        if let Some(text) = component.content() {
            println!("{}", text);
        }
    }
    Ok(())
}
