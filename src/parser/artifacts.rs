use std::fmt::Display;

use crate::core::entities::{ArtifactKind, ExtractedArtifact};
use crate::parser::markers::FENCE;

const EXTENSIONS: &[(&str, &str)] = &[
    ("python", "py"),
    ("py", "py"),
    ("javascript", "js"),
    ("js", "js"),
    ("jsx", "jsx"),
    ("typescript", "ts"),
    ("ts", "ts"),
    ("tsx", "tsx"),
    ("rust", "rs"),
    ("rs", "rs"),
    ("go", "go"),
    ("golang", "go"),
    ("java", "java"),
    ("csharp", "cs"),
    ("cs", "cs"),
    ("cpp", "cpp"),
    ("c++", "cpp"),
    ("c", "c"),
    ("php", "php"),
    ("ruby", "rb"),
    ("rb", "rb"),
    ("swift", "swift"),
    ("kotlin", "kt"),
    ("scala", "scala"),
    ("bash", "sh"),
    ("sh", "sh"),
    ("shell", "sh"),
    ("zsh", "sh"),
    ("fish", "fish"),
    ("sql", "sql"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("sass", "sass"),
    ("less", "less"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("ini", "ini"),
    ("xml", "xml"),
    ("json", "json"),
    ("markdown", "md"),
    ("md", "md"),
];

const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "rs", "go", "java", "cs", "cpp", "c", "php", "rb", "swift",
    "kt", "scala", "sh", "fish", "sql", "html", "css", "scss", "sass", "less", "vue", "svelte",
    "yaml", "toml", "ini", "xml",
];

pub fn extension_for(language: &str) -> String {
    let lang = language.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(name, _)| *name == lang)
        .map(|(_, ext)| ext.to_string())
        .unwrap_or(if lang.is_empty() { "text".to_string() } else { lang })
}

fn kind_for(ext: &str) -> ArtifactKind {
    match ext {
        "json" => ArtifactKind::Json,
        "md" => ArtifactKind::Markdown,
        e if CODE_EXTENSIONS.contains(&e) => ArtifactKind::Code,
        _ => ArtifactKind::Text,
    }
}

/// Every complete fenced block in `content`, in order. Pure: same input, same artifacts.
pub fn extract_artifacts(message_id: impl Display, content: &str) -> Vec<ExtractedArtifact> {
    let mut out = Vec::new();
    let mut cursor = 0;

    while let Some(open) = content[cursor..].find(FENCE) {
        let info_start = cursor + open + FENCE.len();
        let Some(nl) = content[info_start..].find('\n') else {
            break;
        };
        let info = content[info_start..info_start + nl].trim();
        // an info string never contains backticks; this is an inline run, not a fence
        if info.contains('`') {
            cursor = info_start;
            continue;
        }
        let body_start = info_start + nl + 1;
        let Some(close) = content[body_start..].find(FENCE) else {
            break;
        };
        let body_end = body_start + close;
        cursor = body_end + FENCE.len();

        let body = content[body_start..body_end]
            .strip_suffix('\n')
            .map(|b| b.strip_suffix('\r').unwrap_or(b))
            .unwrap_or(&content[body_start..body_end]);

        let language = info.split_whitespace().next().unwrap_or("").to_string();
        let ext = extension_for(&language);
        let index = out.len();
        out.push(ExtractedArtifact {
            id: format!("{message_id}-code-{index}"),
            name: format!("code-{}.{ext}", index + 1),
            kind: kind_for(&ext),
            language: if language.is_empty() { "text".to_string() } else { language },
            content: body.to_string(),
        });
    }

    out
}
