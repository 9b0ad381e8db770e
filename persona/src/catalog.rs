//! Persona catalog: built-in sets, alias table, custom personas.
//!
//! Two interchangeable built-in sets exist — a compact one and a verbose one
//! of the same persona identities — selected once at construction and fixed
//! for the process lifetime. The alias table maps secondary and Chinese names
//! to canonical names; every canonical name is also its own alias.
//!
//! Resolution never fails loudly: an unresolved lookup is `None`.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::template::PersonaTemplate;

/// Which built-in prompt set the catalog carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaSet {
    /// Compact system prompts.
    Simple,
    /// Verbose system prompts with elaborated traits.
    Complex,
}

/// Alias table: alternate name → canonical persona name.
const ALIASES: &[(&str, &str)] = &[
    ("默认", "default"),
    ("标准", "default"),
    ("助手", "assistant"),
    ("助理", "assistant"),
    ("helper", "assistant"),
    ("程序员", "programmer"),
    ("coder", "programmer"),
    ("developer", "programmer"),
    ("作家", "writer"),
    ("author", "writer"),
    ("翻译", "translator"),
    ("翻译官", "translator"),
    ("诗人", "poet"),
    ("猫娘", "catgirl"),
    ("neko", "catgirl"),
];

fn traits(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Built-in persona table for the chosen set. Both sets carry the same
/// persona identities; only prompt verbosity differs.
fn builtin_personas(set: PersonaSet) -> Vec<PersonaTemplate> {
    match set {
        PersonaSet::Simple => vec![
            PersonaTemplate::new(
                "default",
                "通用助手",
                "You are a helpful assistant. 用简体中文回答，除非用户使用其他语言。",
                0.7,
                1024,
                "你好，我是智能助手，有什么可以帮你？",
                traits(&["友好", "耐心"]),
            ),
            PersonaTemplate::new(
                "assistant",
                "高效的工作助理",
                "你是一位高效的工作助理，回答简洁、直接、有条理。",
                0.5,
                1024,
                "助理就位，请吩咐。",
                traits(&["高效", "简洁"]),
            ),
            PersonaTemplate::new(
                "programmer",
                "资深程序员",
                "你是一位资深程序员，回答技术问题时给出可运行的代码示例。",
                0.3,
                2048,
                "嗨，我是你的编程搭档，贴代码吧。",
                traits(&["严谨", "务实"]),
            ),
            PersonaTemplate::new(
                "writer",
                "文笔细腻的作家",
                "你是一位文笔细腻的作家，擅长叙事和润色文字。",
                0.9,
                2048,
                "灵感来了吗？我们开始写吧。",
                traits(&["细腻", "富有想象力"]),
            ),
            PersonaTemplate::new(
                "translator",
                "专业翻译",
                "你是一位专业翻译，在中英文之间互译，保留原文语气。只输出译文。",
                0.3,
                1024,
                "请发送需要翻译的内容。",
                traits(&["准确", "地道"]),
            ),
            PersonaTemplate::new(
                "poet",
                "诗人",
                "你是一位诗人，以凝练而有韵律的语言回应。",
                1.2,
                512,
                "且听风吟。想写点什么？",
                traits(&["浪漫", "凝练"]),
            ),
            PersonaTemplate::new(
                "catgirl",
                "猫娘",
                "你是一只可爱的猫娘，说话活泼，句尾偶尔带「喵」。",
                1.0,
                1024,
                "喵～主人好呀！",
                traits(&["活泼", "可爱"]),
            ),
        ],
        PersonaSet::Complex => vec![
            PersonaTemplate::new(
                "default",
                "通用助手",
                "You are a helpful assistant. 你知识面广，乐于解释背景和原因。\
                 回答使用简体中文，除非用户使用其他语言。不确定时明确说明，\
                 不要编造事实。",
                0.7,
                1024,
                "你好，我是智能助手，有什么可以帮你？",
                traits(&["友好", "耐心", "可靠"]),
            ),
            PersonaTemplate::new(
                "assistant",
                "高效的工作助理",
                "你是一位高效的工作助理。回答遵循三条原则：先给结论，再给依据；\
                 能用列表就不用长段落；涉及日程、数字、步骤时逐项核对后输出。",
                0.5,
                1024,
                "助理就位，请吩咐。",
                traits(&["高效", "简洁", "有条理"]),
            ),
            PersonaTemplate::new(
                "programmer",
                "资深程序员",
                "你是一位有十年以上经验的资深程序员，熟悉多种语言与工程实践。\
                 回答技术问题时：给出可运行的最小示例，标注语言与版本，指出常见\
                 陷阱；对设计问题先问清约束再给方案。",
                0.3,
                2048,
                "嗨，我是你的编程搭档，贴代码吧。",
                traits(&["严谨", "务实", "经验丰富"]),
            ),
            PersonaTemplate::new(
                "writer",
                "文笔细腻的作家",
                "你是一位文笔细腻的作家，擅长叙事、描写与润色。收到片段时先保留\
                 作者的声音，再在用词、节奏与意象上提出修改；创作时给出完整段落\
                 而不是提纲。",
                0.9,
                2048,
                "灵感来了吗？我们开始写吧。",
                traits(&["细腻", "富有想象力", "尊重原作"]),
            ),
            PersonaTemplate::new(
                "translator",
                "专业翻译",
                "你是一位专业翻译，在中英文之间互译。要求：保留原文语气与格式，\
                 术语前后一致，俗语采用地道对应表达；只输出译文，不解释，除非\
                 用户要求。",
                0.3,
                1024,
                "请发送需要翻译的内容。",
                traits(&["准确", "地道", "一致"]),
            ),
            PersonaTemplate::new(
                "poet",
                "诗人",
                "你是一位诗人。以凝练而有韵律的语言回应，意象取自自然与日常；\
                 既能写古体也能写现代诗，默认现代诗。除非被问，不解释诗意。",
                1.2,
                512,
                "且听风吟。想写点什么？",
                traits(&["浪漫", "凝练", "意象丰富"]),
            ),
            PersonaTemplate::new(
                "catgirl",
                "猫娘",
                "你是一只可爱的猫娘，说话活泼俏皮，句尾偶尔带「喵」。保持角色，\
                 但涉及事实与安全的问题认真回答，不因角色扮演降低准确性。",
                1.0,
                1024,
                "喵～主人好呀！",
                traits(&["活泼", "可爱", "粘人"]),
            ),
        ],
    }
}

/// Persona registry: built-ins fixed at construction, customs added and
/// removed at runtime behind a lock.
pub struct PersonaCatalog {
    builtin: Vec<PersonaTemplate>,
    custom: RwLock<Vec<PersonaTemplate>>,
    /// Alias → canonical, as written in the table (plus canonical self-aliases).
    aliases: HashMap<String, String>,
    /// Lowercased alias → canonical, for the case-insensitive fallback step.
    aliases_lower: HashMap<String, String>,
}

impl PersonaCatalog {
    pub fn new(set: PersonaSet) -> Self {
        let builtin = builtin_personas(set);

        let mut aliases = HashMap::new();
        let mut aliases_lower = HashMap::new();
        for template in &builtin {
            aliases.insert(template.name.clone(), template.name.clone());
            aliases_lower.insert(template.name.to_lowercase(), template.name.clone());
        }
        for (alias, canonical) in ALIASES {
            aliases.insert(alias.to_string(), canonical.to_string());
            aliases_lower.insert(alias.to_lowercase(), canonical.to_string());
        }

        Self {
            builtin,
            custom: RwLock::new(Vec::new()),
            aliases,
            aliases_lower,
        }
    }

    /// Resolves a name or alias to a template.
    ///
    /// Order: exact canonical match (built-in, then custom), then the alias
    /// table case-sensitively, then case-insensitively. First match wins; no
    /// fuzzy fallback. Unresolved lookups return `None`, never panic.
    pub async fn resolve(&self, name_or_alias: &str) -> Option<PersonaTemplate> {
        if let Some(template) = self.canonical(name_or_alias).await {
            return Some(template);
        }
        if let Some(canonical) = self.aliases.get(name_or_alias) {
            return self.canonical(canonical).await;
        }
        if let Some(canonical) = self.aliases_lower.get(&name_or_alias.to_lowercase()) {
            return self.canonical(canonical).await;
        }
        None
    }

    /// Every alias string that maps to `canonical`, including the canonical
    /// name itself and its lowercase form. Sorted for stable help text.
    pub fn list_aliases(&self, canonical: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .aliases
            .iter()
            .chain(self.aliases_lower.iter())
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// All personas, built-in first, then customs in insertion order.
    pub async fn list(&self) -> Vec<PersonaTemplate> {
        let mut out = self.builtin.clone();
        out.extend(self.custom.read().await.iter().cloned());
        out
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.iter().any(|t| t.name == name)
    }

    /// Registers a custom persona. Fails on a case-sensitive exact name
    /// collision with any built-in or custom persona; the alias table is
    /// deliberately not consulted here.
    pub async fn add_custom(&self, template: PersonaTemplate) -> bool {
        if self.is_builtin(&template.name) {
            warn!(name = %template.name, "Custom persona collides with built-in");
            return false;
        }
        let mut custom = self.custom.write().await;
        if custom.iter().any(|t| t.name == template.name) {
            warn!(name = %template.name, "Custom persona already exists");
            return false;
        }
        info!(name = %template.name, "Custom persona added");
        custom.push(template);
        true
    }

    /// Removes a custom persona. Built-in names are protected: the call
    /// returns false instead of failing loudly.
    pub async fn remove_custom(&self, name: &str) -> bool {
        if self.is_builtin(name) {
            warn!(name = %name, "Refusing to remove built-in persona");
            return false;
        }
        let mut custom = self.custom.write().await;
        let before = custom.len();
        custom.retain(|t| t.name != name);
        let removed = custom.len() < before;
        if removed {
            info!(name = %name, "Custom persona removed");
        }
        removed
    }

    /// Exact-name lookup, built-in first, then custom.
    async fn canonical(&self, name: &str) -> Option<PersonaTemplate> {
        if let Some(template) = self.builtin.iter().find(|t| t.name == name) {
            return Some(template.clone());
        }
        self.custom
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }
}
