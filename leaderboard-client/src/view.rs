use std::fmt::Write;

use crate::constants::PAGE_RANGE_DISPLAYED;
use crate::controller::{Notice, NoticeLevel, StreamStatus, UserAction, ViewModel};

const TOP_LIMIT: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Action(UserAction),
    Redraw,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  top [n]            get the top n players (default 100)
  page <n>           jump to page n
  next | prev        move one page
  reset              reset the leaderboard
  simulate           simulate one week of changes
  distribute [ratio] distribute the prize pool (default ratio from config)
  help | quit";

pub fn parse_command(line: &str, view: &ViewModel, default_ratio: u32) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(Command::Redraw);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments for {}", word));
    }

    let command = match word.to_ascii_lowercase().as_str() {
        "top" | "t" => {
            let n = parse_number(arg, TOP_LIMIT)?;
            Command::Action(UserAction::GetTop(n))
        }
        "page" | "g" => {
            let page = parse_number(arg.or(Some("")), 0)?;
            if page == 0 {
                return Err("pages start at 1".to_string());
            }
            Command::Action(UserAction::SelectPage(page - 1))
        }
        "next" | "n" => {
            if view.page_count > 0 && view.current_page + 1 >= view.page_count {
                return Err("already on the last page".to_string());
            }
            Command::Action(UserAction::SelectPage(view.current_page + 1))
        }
        "prev" | "p" => {
            if view.current_page == 0 {
                return Err("already on the first page".to_string());
            }
            Command::Action(UserAction::SelectPage(view.current_page - 1))
        }
        "reset" => Command::Action(UserAction::Reset),
        "simulate" | "sim" => Command::Action(UserAction::Simulate),
        "distribute" | "dist" => {
            let ratio = parse_number(arg, u64::from(default_ratio))?;
            let ratio = u32::try_from(ratio).map_err(|_| format!("ratio {} too large", ratio))?;
            Command::Action(UserAction::Distribute(ratio))
        }
        "help" | "?" | "h" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command {:?}; try help", other)),
    };
    Ok(command)
}

fn parse_number(arg: Option<&str>, default: u64) -> Result<u64, String> {
    match arg {
        None => Ok(default),
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| format!("expected a number, got {:?}", value)),
    }
}

/// Zero-based page indices shown by the pager, centred on the current page.
pub fn pager_window(current_page: u64, page_count: u64) -> Vec<u64> {
    if page_count == 0 {
        return Vec::new();
    }
    let half = PAGE_RANGE_DISPLAYED / 2;
    let end = (current_page.saturating_sub(half) + PAGE_RANGE_DISPLAYED).min(page_count);
    let start = end.saturating_sub(PAGE_RANGE_DISPLAYED);
    (start..end).collect()
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn format_diff(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_amount(value))
    } else {
        format_amount(value)
    }
}

fn stream_label(status: &StreamStatus) -> String {
    match status {
        StreamStatus::Connecting => "connecting".to_string(),
        StreamStatus::Connected => "live".to_string(),
        StreamStatus::Unavailable(message) => format!("unavailable ({})", message),
    }
}

pub fn render_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "notice",
        NoticeLevel::Error => "error",
    };
    let line = format!("[{}] {}", tag, notice.message);
    let rule = "*".repeat(line.chars().count() + 4);
    format!("{}\n* {} *\n{}", rule, line, rule)
}

pub fn render(view: &ViewModel, notices: &[Notice]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Leaderboard");

    let mut status = format!("stream: {}", stream_label(&view.stream));
    if view.loading {
        status.push_str(" - loading...");
    }
    if let Some(day) = view.simulation_day {
        let _ = write!(status, " - simulating day {}/7", day);
    }
    let _ = writeln!(out, "{}", status);
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:>6}  {:<20}  {:<8}  {:>14}  {:>10}",
        "rank", "username", "country", "money", "dailydiff"
    );
    if view.rows.is_empty() {
        let _ = writeln!(out, "  (no players loaded)");
    }
    for row in &view.rows {
        let _ = writeln!(
            out,
            "{:>6}  {:<20}  {:<8}  {:>14}  {:>10}",
            row.rank,
            row.username,
            row.country,
            format_amount(row.money),
            format_diff(row.daily_diff)
        );
    }
    let _ = writeln!(out);

    let mut buttons = vec![format!("[Get Top {} Players]", TOP_LIMIT)];
    for button in &view.buttons {
        let marker = if button.state.disabled { " (disabled)" } else { "" };
        buttons.push(format!("[{}{}]", button.label, marker));
    }
    let _ = writeln!(out, "{}", buttons.join(" "));

    let pages = pager_window(view.current_page, view.page_count);
    if !pages.is_empty() {
        let mut pager = String::from("<");
        for page in pages {
            if page == view.current_page {
                let _ = write!(pager, " [{}]", page + 1);
            } else {
                let _ = write!(pager, " {}", page + 1);
            }
        }
        let _ = write!(pager, " >  page {} of {}", view.current_page + 1, view.page_count);
        let _ = writeln!(out, "{}", pager);
    }

    for notice in notices {
        let _ = writeln!(out, "{}", render_notice(notice));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::lifecycle::OperationKind;
    use crate::models::PlayerRecord;

    fn view_with(current_page: u64, page_count: u64) -> ViewModel {
        let mut view = Controller::new().view();
        view.current_page = current_page;
        view.page_count = page_count;
        view
    }

    #[test]
    fn pager_shows_five_pages_around_current() {
        assert_eq!(pager_window(0, 0), Vec::<u64>::new());
        assert_eq!(pager_window(0, 3), vec![0, 1, 2]);
        assert_eq!(pager_window(0, 10), vec![0, 1, 2, 3, 4]);
        assert_eq!(pager_window(5, 10), vec![3, 4, 5, 6, 7]);
        assert_eq!(pager_window(9, 10), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn page_command_is_one_based() {
        let view = view_with(0, 10);
        assert_eq!(
            parse_command("page 4", &view, 2),
            Ok(Command::Action(UserAction::SelectPage(3)))
        );
        assert!(parse_command("page 0", &view, 2).is_err());
        assert!(parse_command("page", &view, 2).is_err());
    }

    #[test]
    fn next_and_prev_respect_bounds() {
        let view = view_with(9, 10);
        assert!(parse_command("next", &view, 2).is_err());
        assert_eq!(
            parse_command("prev", &view, 2),
            Ok(Command::Action(UserAction::SelectPage(8)))
        );
        let view = view_with(0, 10);
        assert!(parse_command("prev", &view, 2).is_err());
    }

    #[test]
    fn operation_commands_map_to_actions() {
        let view = view_with(0, 0);
        assert_eq!(
            parse_command("distribute", &view, 2),
            Ok(Command::Action(UserAction::Distribute(2)))
        );
        assert_eq!(
            parse_command("dist 5", &view, 2),
            Ok(Command::Action(UserAction::Distribute(5)))
        );
        assert_eq!(
            parse_command("top", &view, 2),
            Ok(Command::Action(UserAction::GetTop(100)))
        );
        assert_eq!(parse_command("  ", &view, 2), Ok(Command::Redraw));
        assert_eq!(parse_command("QUIT", &view, 2), Ok(Command::Quit));
        assert!(parse_command("dance", &view, 2).is_err());
    }

    #[test]
    fn render_lists_rows_buttons_and_pager() {
        let mut view = view_with(1, 3);
        view.rows = vec![PlayerRecord {
            rank: 101,
            username: "alice".to_string(),
            money: 1500.0,
            country: "US".to_string(),
            daily_diff: 12.5,
        }];
        let text = render(&view, &[Notice::error("Reset failed")]);
        assert!(text.contains("alice"));
        assert!(text.contains("+12.50"));
        assert!(text.contains("[Reset Leaderboard]"));
        assert!(text.contains("[Simulate Weekly Changes]"));
        assert!(text.contains("< 1 [2] 3 >"));
        assert!(text.contains("[error] Reset failed"));
    }

    #[test]
    fn render_marks_running_operation() {
        let mut controller = Controller::new();
        controller.handle(crate::controller::Input::User(UserAction::Simulate));
        let view = controller.view();
        let text = render(&view, &[]);
        assert!(text.contains("[Simulation continues... (disabled)]"));
        assert!(text.contains("[Reset Leaderboard (disabled)]"));
        let simulation = view
            .buttons
            .iter()
            .find(|button| button.kind == OperationKind::Simulation)
            .unwrap();
        assert!(!simulation.state.stopped);
    }
}
