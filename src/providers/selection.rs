//! Interactive model selection and model id helpers.

use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

use crate::providers::ModelPreset;

const SKIP_ANSWERS: [&str; 3] = ["s", "skip", "pular"];
const CONFIRM_ANSWERS: [&str; 4] = ["s", "sim", "y", "yes"];
const NON_CHAT_TOKENS: [&str; 8] = ["embedding", "moderation", "whisper", "tts", "dall-e", "image", "audio", "transcribe"];

/// File-name friendly form of a model id: the last path segment with `-` turned into `_` and dots
/// removed.
///
/// # Example
/// ```
/// use automgr::providers::selection::safe_model_name;
///
/// assert_eq!(safe_model_name("models/gemini-2.5-pro"), "gemini_25_pro");
/// assert_eq!(safe_model_name("qwen/qwen-2.5-72b-instruct"), "qwen_25_72b_instruct");
/// ```
pub fn safe_model_name(model: &str) -> String {
    let last = model.rsplit('/').next().unwrap_or(model);
    last.replace('-', "_").replace('.', "")
}

/// Gemini ids of the `models/gemini*` family. Ids without the `models/` prefix are accepted too.
pub fn is_gemini_model(id: &str) -> bool {
    id.strip_prefix("models/").unwrap_or(id).starts_with("gemini")
}

/// OpenAI ids that look like chat models: `gpt-*` or `o*`, excluding embedding, audio, image and
/// moderation models.
pub fn is_chat_model(id: &str) -> bool {
    let starts_like_chat = id.starts_with("gpt-") || id.starts_with('o');
    starts_like_chat && !NON_CHAT_TOKENS.iter().any(|token| id.contains(token))
}

/// Parses a 1-based selection such as `"1, 3-5"` against a list of `max_value` items.
///
/// Ranges may be descending (`"5-3"`). Repeated indexes keep their first position. Returns `None`
/// for an empty input or if any part is malformed or out of range.
///
/// # Example
/// ```
/// use automgr::providers::selection::parse_indexes;
///
/// assert_eq!(parse_indexes("2, 4-3,2", 5), Some(vec![2, 4, 3]));
/// assert_eq!(parse_indexes("6", 5), None);
/// ```
pub fn parse_indexes(value: &str, max_value: usize) -> Option<Vec<usize>> {
    let raw: String = value.chars().filter(|c| *c != ' ').collect();
    if raw.is_empty() {
        return None;
    }

    let parse_index = |part: &str| -> Option<usize> {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        part.parse().ok().filter(|idx| (1..=max_value).contains(idx))
    };

    let mut indexes = Vec::new();
    let mut push = |idx: usize| {
        if !indexes.contains(&idx) {
            indexes.push(idx);
        }
    };
    for part in raw.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_index(start)?, parse_index(end)?);
                if end >= start {
                    (start..=end).for_each(&mut push);
                } else {
                    (end..=start).rev().for_each(&mut push);
                }
            }
            None => push(parse_index(part)?),
        }
    }
    Some(indexes)
}

/// Result of an interactive model selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Keep whatever the caller had configured.
    KeepDefault,
    /// Do not run this provider.
    Skip,
    Chosen(Vec<String>),
}

/// Options of [select_models].
#[derive(Debug, Clone)]
pub struct SelectOptions<'a> {
    /// Current default, shown in the header.
    pub default: &'a [String],
    pub allow_multiple: bool,
    /// Accept an id that is not in the list after confirmation.
    pub allow_custom: bool,
    pub max_display: usize,
}

impl Default for SelectOptions<'_> {
    fn default() -> Self {
        Self {
            default: &[],
            allow_multiple: false,
            allow_custom: true,
            max_display: 30,
        }
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Lets the user pick models from `options` through `input`, writing the menu to `output`.
///
/// Answers: empty keeps the default, `s` skips the provider, `*` resets the filter, an index list
/// picks from the current view, an exact id picks it, any other text narrows the view to ids
/// containing it. End of input keeps the default.
pub fn select_models<R: BufRead, W: Write>(label: &str,
                                           options: &[String],
                                           select: &SelectOptions<'_>,
                                           input: &mut R,
                                           output: &mut W) -> io::Result<Selection> {
    let options: Vec<String> = options
        .iter()
        .filter(|opt| !opt.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if options.is_empty() {
        writeln!(output, "[{}] No models available for selection.", label)?;
        return Ok(Selection::KeepDefault);
    }

    let mut filtered = options.clone();
    loop {
        writeln!(output, "\n{}", "=".repeat(50))?;
        writeln!(output, "Model selection - {}", label)?;
        if !select.default.is_empty() {
            let shown_default = if select.allow_multiple { select.default.join(", ") } else { select.default[0].clone() };
            writeln!(output, "Current default: {}", shown_default)?;
        }
        writeln!(output, "Tips: ENTER=keep default | s=skip | *=reset filter | type text to filter")?;
        for (i, model) in filtered.iter().take(select.max_display).enumerate() {
            writeln!(output, "{:>2}) {}", i + 1, model)?;
        }
        if filtered.len() > select.max_display {
            writeln!(output, "... showing {} of {} (use a filter to narrow)", select.max_display, filtered.len())?;
        }
        write!(output, "{}", if select.allow_multiple { "Choose (n, n,n or n-n): " } else { "Choose: " })?;
        output.flush()?;

        let choice = match read_answer(input)? {
            Some(choice) => choice,
            None => return Ok(Selection::KeepDefault),
        };
        if choice.is_empty() {
            return Ok(Selection::KeepDefault);
        }

        let lower = choice.to_lowercase();
        if SKIP_ANSWERS.contains(&lower.as_str()) {
            return Ok(Selection::Skip);
        }
        if lower == "*" {
            filtered = options.clone();
            continue;
        }

        if let Some(indexes) = parse_indexes(&choice, filtered.len()) {
            let mut selected: Vec<String> = indexes.into_iter().map(|i| filtered[i - 1].clone()).collect();
            if !select.allow_multiple {
                selected.truncate(1);
            }
            return Ok(Selection::Chosen(selected));
        }

        if options.contains(&choice) {
            return Ok(Selection::Chosen(vec![choice]));
        }

        let matches: Vec<String> = options.iter().filter(|m| m.to_lowercase().contains(&lower)).cloned().collect();
        if !matches.is_empty() {
            filtered = matches;
            continue;
        }

        if select.allow_custom {
            write!(output, "Model '{}' is not in the list. Use it anyway? [s/N]: ", choice)?;
            output.flush()?;
            let confirm = read_answer(input)?.unwrap_or_default().to_lowercase();
            if CONFIRM_ANSWERS.contains(&confirm.as_str()) {
                return Ok(Selection::Chosen(vec![choice]));
            }
        }

        writeln!(output, "Invalid option. Try again.")?;
    }
}

/// Answer to the OpenRouter preset menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    /// Run every preset.
    All,
    Preset(&'static str),
    /// A slug typed by the user, e.g. `deepseek/deepseek-chat`.
    Custom(String),
    Invalid,
}

pub fn parse_menu_choice(choice: &str, presets: &[ModelPreset]) -> MenuChoice {
    let choice = choice.trim().to_lowercase();
    if choice == "todas" || choice == "all" {
        return MenuChoice::All;
    }
    if let Some(preset) = choice.parse::<usize>().ok().and_then(|n| n.checked_sub(1)).and_then(|i| presets.get(i)) {
        return MenuChoice::Preset(preset.slug);
    }
    if choice.contains('/') {
        return MenuChoice::Custom(choice);
    }
    MenuChoice::Invalid
}

/// Prints the preset menu and reads one answer. End of input is [MenuChoice::Invalid].
pub fn prompt_menu<R: BufRead, W: Write>(presets: &[ModelPreset], input: &mut R, output: &mut W) -> io::Result<MenuChoice> {
    writeln!(output, "\n=== MENU (OPENROUTER) ===")?;
    for (i, preset) in presets.iter().enumerate() {
        writeln!(output, "{}) {} - {}", i + 1, preset.name, preset.description)?;
    }
    write!(output, "\nType the number (or 'todas'): ")?;
    output.flush()?;
    Ok(read_answer(input)?.map_or(MenuChoice::Invalid, |choice| parse_menu_choice(&choice, presets)))
}

#[cfg(test)]
mod test_selection {
    use std::io::Cursor;

    use super::{is_chat_model, is_gemini_model, parse_indexes, parse_menu_choice, prompt_menu, select_models, MenuChoice, SelectOptions, Selection};
    use crate::providers::OPENROUTER_PRESETS;

    fn models(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn run_select(options: &[String], select: &SelectOptions<'_>, answers: &str) -> (Selection, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let selection = select_models("Test", options, select, &mut input, &mut output).unwrap();
        (selection, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_parse_indexes() {
        assert_eq!(parse_indexes("1", 3), Some(vec![1]));
        assert_eq!(parse_indexes(" 1 , 3 ", 3), Some(vec![1, 3]));
        assert_eq!(parse_indexes("1-3", 3), Some(vec![1, 2, 3]));
        assert_eq!(parse_indexes("3-1", 3), Some(vec![3, 2, 1]));
        assert_eq!(parse_indexes("2,1-3", 3), Some(vec![2, 1, 3]));
        assert_eq!(parse_indexes("", 3), None);
        assert_eq!(parse_indexes("   ", 3), None);
        assert_eq!(parse_indexes("0", 3), None);
        assert_eq!(parse_indexes("4", 3), None);
        assert_eq!(parse_indexes("1,", 3), None);
        assert_eq!(parse_indexes("a", 3), None);
        assert_eq!(parse_indexes("1-", 3), None);
        assert_eq!(parse_indexes("-1", 3), None);
        assert_eq!(parse_indexes("+1", 3), None);
    }

    #[test]
    fn test_model_filters() {
        assert!(is_gemini_model("models/gemini-2.5-pro"));
        assert!(is_gemini_model("gemini-2.0-flash"));
        assert!(!is_gemini_model("models/text-embedding-004"));
        assert!(is_chat_model("gpt-4o"));
        assert!(is_chat_model("o3-mini"));
        assert!(!is_chat_model("gpt-4o-audio-preview"));
        assert!(!is_chat_model("text-embedding-3-small"));
        assert!(!is_chat_model("omni-moderation-latest"));
    }

    #[test]
    fn test_keep_default_and_skip() {
        let options = models(&["b", "a"]);
        assert_eq!(run_select(&options, &SelectOptions::default(), "\n").0, Selection::KeepDefault);
        assert_eq!(run_select(&options, &SelectOptions::default(), "").0, Selection::KeepDefault);
        assert_eq!(run_select(&options, &SelectOptions::default(), "PULAR\n").0, Selection::Skip);
        assert_eq!(run_select(&[], &SelectOptions::default(), "1\n").0, Selection::KeepDefault);
    }

    #[test]
    fn test_pick_by_index() {
        let options = models(&["gpt-4o-mini", "gpt-4o", "gpt-4o"]);
        let (selection, output) = run_select(&options, &SelectOptions::default(), "2,1\n");
        assert_eq!(selection, Selection::Chosen(models(&["gpt-4o-mini"])));
        assert!(output.contains(" 1) gpt-4o\n"));

        let select = SelectOptions { allow_multiple: true, ..SelectOptions::default() };
        let (selection, _) = run_select(&options, &select, "2,1\n");
        assert_eq!(selection, Selection::Chosen(models(&["gpt-4o-mini", "gpt-4o"])));
    }

    #[test]
    fn test_filter_then_pick() {
        let options = models(&["llama-3.1-8b-instant", "llama-3.3-70b-versatile", "mixtral-8x7b-32768"]);
        let (selection, _) = run_select(&options, &SelectOptions::default(), "70B\n1\n");
        assert_eq!(selection, Selection::Chosen(models(&["llama-3.3-70b-versatile"])));

        let (selection, _) = run_select(&options, &SelectOptions::default(), "llama\n*\n3\n");
        assert_eq!(selection, Selection::Chosen(models(&["mixtral-8x7b-32768"])));

        let (selection, _) = run_select(&options, &SelectOptions::default(), "mixtral-8x7b-32768\n");
        assert_eq!(selection, Selection::Chosen(models(&["mixtral-8x7b-32768"])));
    }

    #[test]
    fn test_custom_model() {
        let options = models(&["a/model"]);
        let (selection, _) = run_select(&options, &SelectOptions::default(), "x/other\nsim\n");
        assert_eq!(selection, Selection::Chosen(models(&["x/other"])));

        let (selection, output) = run_select(&options, &SelectOptions::default(), "x/other\nn\n\n");
        assert_eq!(selection, Selection::KeepDefault);
        assert!(output.contains("Invalid option"));

        let select = SelectOptions { allow_custom: false, ..SelectOptions::default() };
        let (selection, output) = run_select(&options, &select, "x/other\ns\n");
        assert_eq!(selection, Selection::Skip);
        assert!(!output.contains("Use it anyway"));
    }

    #[test]
    fn test_display_limit_and_default() {
        let options: Vec<String> = (0..5).map(|i| format!("m{}", i)).collect();
        let default = models(&["m3", "m4"]);
        let select = SelectOptions { default: &default, allow_multiple: true, max_display: 2, ..SelectOptions::default() };
        let (_, output) = run_select(&options, &select, "\n");
        assert!(output.contains("Current default: m3, m4"));
        assert!(output.contains("... showing 2 of 5"));
        assert!(!output.contains(" 3) m2"));
    }

    #[test]
    fn test_menu_choice() {
        assert_eq!(parse_menu_choice("Todas", &OPENROUTER_PRESETS), MenuChoice::All);
        assert_eq!(parse_menu_choice("1", &OPENROUTER_PRESETS), MenuChoice::Preset("deepseek/deepseek-chat"));
        assert_eq!(parse_menu_choice("5", &OPENROUTER_PRESETS), MenuChoice::Preset("mistralai/mistral-small-24b-instruct-2501"));
        assert_eq!(parse_menu_choice("6", &OPENROUTER_PRESETS), MenuChoice::Invalid);
        assert_eq!(parse_menu_choice("0", &OPENROUTER_PRESETS), MenuChoice::Invalid);
        assert_eq!(parse_menu_choice("google/gemma-2", &OPENROUTER_PRESETS), MenuChoice::Custom("google/gemma-2".to_string()));
        assert_eq!(parse_menu_choice("x", &OPENROUTER_PRESETS), MenuChoice::Invalid);

        let mut input = std::io::Cursor::new(b"2\n".to_vec());
        let mut output = Vec::new();
        let choice = prompt_menu(&OPENROUTER_PRESETS, &mut input, &mut output).unwrap();
        assert_eq!(choice, MenuChoice::Preset("qwen/qwen-2.5-72b-instruct"));
        assert!(String::from_utf8(output).unwrap().contains("2) Qwen 2.5 72B Instruct"));
    }
}
