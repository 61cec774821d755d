// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use hello_langgraph::adk::agent::AgentEvent;
use hello_langgraph::adk::model::{Content, Part};
use hello_langgraph::config::Settings;
use hello_langgraph::recipes::chatbot::Chatbot;
use hello_langgraph::recipes::{Recipe, RecipeFactory};
use std::io::{IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Recipe(Recipe),
    /// Print the Mermaid diagram of a recipe's graph
    Graph {
        /// Recipe name, e.g. plan-execute
        recipe: Recipe,
    },
    /// List the tools available to the recipes
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Settings::load()?;
    let factory = RecipeFactory::from_settings(settings).await?;

    match args.command {
        Commands::Graph { recipe } => match factory.draw(recipe).await? {
            Some(mermaid) => println!("{}", mermaid),
            None => println!("{} is not a graph", recipe),
        },
        Commands::Tools => {
            for name in factory.registry().names().await {
                println!("{}", name);
            }
        }
        Commands::Recipe(Recipe::Chatbot) => chat(&factory).await?,
        Commands::Recipe(recipe) => run(&factory, recipe).await?,
    }

    Ok(())
}

/// All of stdin, or the recipe's example when stdin is a terminal or empty
async fn read_input(recipe: Recipe) -> anyhow::Result<String> {
    if std::io::stdin().is_terminal() {
        return Ok(recipe.example_input().to_string());
    }
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    let input = buf.trim();
    if input.is_empty() {
        Ok(recipe.example_input().to_string())
    } else {
        Ok(input.to_string())
    }
}

async fn run(factory: &RecipeFactory, recipe: Recipe) -> anyhow::Result<()> {
    let input = read_input(recipe).await?;
    let agent = factory.build(recipe).await?;
    println!("[{}] {}", agent.name(), input);

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::Step { node, detail } => println!("{} :::: {}", node, detail),
                AgentEvent::Error(e) => eprintln!("Error: {}", e),
                AgentEvent::Answer(_) => {}
            }
        }
    });

    let answer = agent.run_stream(input, tx).await;
    printer.await?;
    println!("\n{}", answer?);
    Ok(())
}

async fn chat(factory: &RecipeFactory) -> anyhow::Result<()> {
    let bot = Chatbot::new(factory.model())?;
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("User (q/Q to quit): ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !interactive {
            println!("User (q/Q to quit): {}", line);
        }
        if line == "q" || line == "Q" {
            println!("AI: Byebye");
            break;
        }

        let turn = bot.chat(line).await?;
        for reply in &turn.replies {
            println!("{}", render(reply));
        }
        if turn.prompt_generated {
            println!("Done!");
        }
    }
    Ok(())
}

fn render(message: &Content) -> String {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) if !text.is_empty() => Some(format!("{}: {}", message.role, text)),
            Part::FunctionCall { name, args, .. } => {
                Some(format!("{}: call {} {}", message.role, name, args))
            }
            Part::FunctionResponse { name, response, .. } => {
                Some(format!("{} ({}): {}", message.role, name, response))
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
