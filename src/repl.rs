//! Line-oriented chat loop.
//!
//! Reads user lines, routes slash commands locally and sends everything
//! else through the [`ChatSession`].

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::db::meals::MealFilter;
use crate::session::{ChatSession, ReplyStyle};

/// Help text displayed for the /help command.
const HELP_TEXT: &str = "可用命令:
  /user <名字>     切换用户
  /style <风格>    回复风格: 轻松, 幽默, 正式
  /meals           查看我的饮食记录
  /categories      查看食物分类
  /help            显示帮助
  /quit, /exit     退出

其他输入会直接发送给健康食谱助手。";

/// A parsed line of chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Text for the assistant.
    Chat(String),
    SetUser(String),
    SetStyle(String),
    Meals,
    Categories,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let input = input.trim();

        if input.is_empty() {
            return Command::Empty;
        }

        if !input.starts_with('/') {
            return Command::Chat(input.to_string());
        }

        let parts: Vec<&str> = input.splitn(2, ' ').collect();
        let command = parts[0].to_lowercase();
        let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

        match command.as_str() {
            "/user" => Command::SetUser(args.to_string()),
            "/style" => Command::SetStyle(args.to_string()),
            "/meals" => Command::Meals,
            "/categories" => Command::Categories,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Unknown(command),
        }
    }
}

/// Runs the chat loop until end of input or `/quit`.
pub async fn run<R, W>(session: &mut ChatSession, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    write_line(&mut output, "🍲 健康食谱助手 (输入 /help 查看命令)").await?;
    if session.user_name().is_empty() {
        write_line(&mut output, "请先使用 /user <名字> 设置用户名。").await?;
    }

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = Command::parse(&line);
        debug!(?command, "Chat input");

        match command {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => write_line(&mut output, HELP_TEXT).await?,
            Command::Unknown(name) => {
                write_line(&mut output, &format!("未知命令: {name}，输入 /help 查看命令")).await?
            }
            Command::SetUser(name) => {
                if name.is_empty() {
                    write_line(&mut output, "用法: /user <名字>").await?;
                } else {
                    session.set_user_name(name);
                    write_line(&mut output, &format!("当前用户: {}", session.user_name())).await?;
                }
            }
            Command::SetStyle(style) => match style.parse::<ReplyStyle>() {
                Ok(style) => {
                    session.set_style(style);
                    write_line(&mut output, &format!("回复风格: {style}")).await?;
                }
                Err(e) => write_line(&mut output, &e.to_string()).await?,
            },
            Command::Meals => {
                let text = match session.meals(&MealFilter::default()).await {
                    Ok(meals) if meals.is_empty() => "还没有饮食记录。".to_string(),
                    Ok(meals) => meals
                        .iter()
                        .map(|m| match &m.category_name {
                            Some(category) => {
                                format!("{} {} {} ({category})", m.meal_date, m.meal_type, m.food_name)
                            }
                            None => format!("{} {} {}", m.meal_date, m.meal_type, m.food_name),
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => {
                        error!(error = %e, "Failed to list meals");
                        e.to_string()
                    }
                };
                write_line(&mut output, &text).await?;
            }
            Command::Categories => {
                let text = match session.food_categories().await {
                    Ok(categories) => categories
                        .iter()
                        .map(|c| {
                            format!(
                                "{}: {}",
                                c.category_name,
                                c.recommended_frequency.as_deref().unwrap_or("-")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => {
                        error!(error = %e, "Failed to list food categories");
                        e.to_string()
                    }
                };
                write_line(&mut output, &text).await?;
            }
            Command::Chat(text) => {
                for reply in session.send(&text).await {
                    write_line(&mut output, &reply).await?;
                }
            }
        }
    }

    output.flush().await
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await
}
