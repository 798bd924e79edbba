//! Ontology source → AST parser
//!
//! The grammar is line oriented: every construct sits on its own line, blocks
//! open with `{` at the end of a header line and close with a lone `}`.
//! Blank lines and `#` comments are skipped. Parsing either yields a complete
//! [`Ontology`] or a single [`Error::Parse`] naming the offending line.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::naming::{id_slug, pascal_case};
use crate::ontology::*;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("Invalid regex pattern"));
    };
}

pattern!(ONTOLOGY_HEADER, r"^ontology\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{$");
pattern!(
    TOP_LEVEL_BLOCK,
    r"^(type|object|struct|actionInput|actionOutput|action|signal|trigger)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{$"
);
pattern!(ID_LINE, r#"^id\s+"(.*)"$"#);
pattern!(VERSION_LINE, r#"^version\s+"(.*)"$"#);
pattern!(DESCRIPTION_LINE, r#"^(?:description|documentation)\s+"(.*)"$"#);
pattern!(NAME_LINE, r#"^name\s+"(.*)"$"#);
pattern!(FIELD_OPEN, r"^field\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{$");
pattern!(STATE_OPEN, r"^state\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{$");
pattern!(TRANSITION_OPEN, r"^transition\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{$");
pattern!(KEY_DECL, r"^key\s+([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$");
pattern!(FIELD_KEY, r"^key\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(TYPE_EXPR, r"^type\s+(.+)$");
pattern!(BASE_LINE, r"^base\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(CONSTRAINT_LINE, r#"^constraint\s+([A-Za-z_][A-Za-z0-9_]*)\s+"(.*)"$"#);
pattern!(FROM_LINE, r"^from\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(TO_LINE, r"^to\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(KIND_LINE, r"^kind\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(INPUT_REF, r"^input\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(OUTPUT_SIGNAL, r"^output\s+signal\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(
    OUTPUT_TRANSITION,
    r"^output\s+transition\s+([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)$"
);
pattern!(OUTPUT_REF, r"^output\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(WHEN_EVENT, r"^when\s+event\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(INVOKE_LINE, r"^invoke\s+([A-Za-z_][A-Za-z0-9_]*)$");
pattern!(IDENTIFIER, r"^[A-Za-z_][A-Za-z0-9_]*$");

/// Parse ontology source text
pub fn parse_ontology(text: &str) -> Result<Ontology> {
    Parser::new(text).parse()
}

/// Parse an ontology file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Ontology> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_ontology(&content)
}

/// Hands out ids for elements declared without an explicit `id`
///
/// Every explicit id in the source is reserved up front, so a generated id
/// never shadows one the author wrote further down the file.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    /// Create an allocator with `reserved` ids already taken
    pub fn new(reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            used: reserved.into_iter().collect(),
        }
    }

    /// Mark an id as taken
    pub fn reserve(&mut self, id: &str) {
        self.used.insert(id.to_string());
    }

    /// Next free slug for `base`, suffixed `_2`, `_3`, … on collision
    pub fn generate(&mut self, base: &str) -> String {
        let slug = match id_slug(base) {
            s if s.is_empty() => "id".to_string(),
            s => s,
        };
        let mut candidate = slug.clone();
        let mut suffix = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{slug}_{suffix}");
            suffix += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Metadata lines shared by every block kind
#[derive(Debug, Default)]
struct Meta {
    id: Option<String>,
    description: Option<String>,
    display_name: Option<String>,
}

/// Line-oriented ontology parser
pub struct Parser {
    lines: Vec<(usize, String)>,
    pos: usize,
    ids: IdAllocator,
}

impl Parser {
    /// Create a parser over ontology source text
    pub fn new(text: &str) -> Self {
        let lines: Vec<(usize, String)> = text
            .lines()
            .enumerate()
            .map(|(i, raw)| (i + 1, raw.trim().to_string()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let reserved = lines
            .iter()
            .filter_map(|(_, line)| ID_LINE.captures(line).map(|c| c[1].to_string()));
        let ids = IdAllocator::new(reserved);
        Self {
            lines,
            pos: 0,
            ids,
        }
    }

    /// Parse the whole input into an ontology
    pub fn parse(mut self) -> Result<Ontology> {
        let (header_line, header) = self.next_line("ontology header", 0)?;
        let name = ONTOLOGY_HEADER
            .captures(&header)
            .map(|c| c[1].to_string())
            .ok_or_else(|| {
                Error::parse(
                    header_line,
                    format!("expected ontology header 'ontology <Name> {{', found: {header}"),
                )
            })?;

        let mut meta = Meta::default();
        let mut version = None;
        let mut ontology = Ontology {
            name: name.clone(),
            id: String::new(),
            version: String::new(),
            description: None,
            display_name: None,
            types: Vec::new(),
            objects: Vec::new(),
            structs: Vec::new(),
            action_inputs: Vec::new(),
            action_outputs: Vec::new(),
            actions: Vec::new(),
            signals: Vec::new(),
            triggers: Vec::new(),
        };

        loop {
            let (ln, line) = self.next_line(&format!("ontology {name}"), header_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = VERSION_LINE.captures(&line) {
                version = Some(c[1].to_string());
                continue;
            }
            let Some(c) = TOP_LEVEL_BLOCK.captures(&line) else {
                return Err(Error::parse(ln, format!("unexpected line: {line}")));
            };
            let block_name = c[2].to_string();
            match &c[1] {
                "type" => ontology.types.push(self.type_block(block_name, ln)?),
                "object" => ontology.objects.push(self.object_block(block_name, ln)?),
                "struct" => {
                    let scope = format!("struct_{block_name}");
                    ontology
                        .structs
                        .push(self.shape_block(block_name, ln, "struct", &scope)?);
                }
                "actionInput" => {
                    let scope = format!("ain_{block_name}");
                    ontology
                        .action_inputs
                        .push(self.shape_block(block_name, ln, "actionInput", &scope)?);
                }
                "actionOutput" => {
                    let scope = format!("aout_{block_name}");
                    ontology
                        .action_outputs
                        .push(self.shape_block(block_name, ln, "actionOutput", &scope)?);
                }
                "signal" => {
                    let scope = format!("sig_{block_name}");
                    ontology
                        .signals
                        .push(self.shape_block(block_name, ln, "signal", &scope)?);
                }
                "trigger" => ontology.triggers.push(self.trigger_block(block_name, ln)?),
                _ => {
                    let (action, input, output) = self.action_block(block_name, ln)?;
                    ontology.action_inputs.extend(input);
                    ontology.action_outputs.extend(output);
                    ontology.actions.push(action);
                }
            }
        }

        if let Some((ln, line)) = self.lines.get(self.pos) {
            return Err(Error::parse(
                *ln,
                format!("unexpected content after ontology block: {line}"),
            ));
        }

        ontology.version = version.ok_or_else(|| {
            Error::parse(header_line, format!("ontology {name} missing version"))
        })?;
        ontology.id = match meta.id {
            Some(id) => id,
            None => self.ids.generate(&format!("ont_{name}")),
        };
        ontology.description = meta.description;
        ontology.display_name = meta.display_name;
        Ok(ontology)
    }

    fn next_line(&mut self, context: &str, opened_at: usize) -> Result<(usize, String)> {
        match self.lines.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                Ok(entry.clone())
            }
            None => Err(Error::parse(
                opened_at,
                format!("unexpected end of input: {context} is not closed"),
            )),
        }
    }

    /// Consume `id`, `description`/`documentation`, and `name` lines
    fn metadata(&mut self, ln: usize, line: &str, meta: &mut Meta) -> Result<bool> {
        if let Some(c) = ID_LINE.captures(line) {
            let id = c[1].to_string();
            self.ids.reserve(&id);
            meta.id = Some(id);
            return Ok(true);
        }
        if let Some(c) = DESCRIPTION_LINE.captures(line) {
            meta.description = Some(c[1].to_string());
            return Ok(true);
        }
        if let Some(c) = NAME_LINE.captures(line) {
            let value = c[1].trim();
            if value.is_empty() {
                return Err(Error::parse(ln, "name must not be empty"));
            }
            if meta.display_name.is_some() {
                return Err(Error::parse(ln, "duplicate name metadata"));
            }
            meta.display_name = Some(value.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    fn type_block(&mut self, name: String, block_line: usize) -> Result<TypeDef> {
        let mut meta = Meta::default();
        let mut base = None;
        let mut constraints = BTreeMap::new();
        loop {
            let (ln, line) = self.next_line(&format!("type {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = BASE_LINE.captures(&line) {
                base = Some(c[1].to_string());
                continue;
            }
            if let Some(c) = CONSTRAINT_LINE.captures(&line) {
                constraints.insert(c[1].to_string(), c[2].to_string());
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected type line: {line}")));
        }

        let base =
            base.ok_or_else(|| Error::parse(block_line, format!("type {name} missing base")))?;
        let id = self.id_or_generate(meta.id, &format!("type_{name}"));
        Ok(TypeDef {
            name,
            id,
            base,
            constraints,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn object_block(&mut self, name: String, block_line: usize) -> Result<ObjectDef> {
        let mut meta = Meta::default();
        let mut fields = Vec::new();
        let mut keys = Vec::new();
        let mut states = Vec::new();
        let mut transitions = Vec::new();
        let scope = format!("obj_{name}");
        loop {
            let (ln, line) = self.next_line(&format!("object {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = FIELD_OPEN.captures(&line) {
                fields.push(self.field_block(c[1].to_string(), ln, &scope)?);
                continue;
            }
            if let Some(c) = KEY_DECL.captures(&line) {
                keys.push(KeyDef {
                    kind: c[1].to_string(),
                    field_names: key_field_names(&c[2], ln)?,
                    line: ln,
                });
                continue;
            }
            if let Some(c) = STATE_OPEN.captures(&line) {
                states.push(self.state_block(c[1].to_string(), ln, &name)?);
                continue;
            }
            if let Some(c) = TRANSITION_OPEN.captures(&line) {
                transitions.push(self.transition_block(c[1].to_string(), ln, &name)?);
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected object line: {line}")));
        }

        let id = self.id_or_generate(meta.id, &scope);
        Ok(ObjectDef {
            name,
            id,
            fields,
            keys,
            states,
            transitions,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn shape_block(
        &mut self,
        name: String,
        block_line: usize,
        label: &str,
        scope: &str,
    ) -> Result<ShapeDef> {
        let mut meta = Meta::default();
        let mut fields = Vec::new();
        loop {
            let (ln, line) = self.next_line(&format!("{label} {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = FIELD_OPEN.captures(&line) {
                fields.push(self.field_block(c[1].to_string(), ln, scope)?);
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected {label} line: {line}")));
        }

        let id = self.id_or_generate(meta.id, scope);
        Ok(ShapeDef {
            name,
            id,
            fields,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn field_block(&mut self, name: String, block_line: usize, scope: &str) -> Result<FieldDef> {
        let mut meta = Meta::default();
        let mut type_expr = None;
        let mut required = true;
        let mut key = None;
        loop {
            let (ln, line) = self.next_line(&format!("field {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = TYPE_EXPR.captures(&line) {
                type_expr = Some(c[1].trim().to_string());
                continue;
            }
            match line.as_str() {
                "required" => {
                    required = true;
                    continue;
                }
                "optional" => {
                    required = false;
                    continue;
                }
                _ => {}
            }
            if let Some(c) = FIELD_KEY.captures(&line) {
                key = Some(c[1].to_string());
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected field line: {line}")));
        }

        let type_expr = type_expr
            .ok_or_else(|| Error::parse(block_line, format!("field {name} missing type")))?;
        let id = self.id_or_generate(meta.id, &format!("fld_{scope}_{name}"));
        Ok(FieldDef {
            name,
            id,
            type_expr,
            required,
            key,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn state_block(&mut self, name: String, block_line: usize, object: &str) -> Result<StateDef> {
        let mut meta = Meta::default();
        let mut initial = false;
        loop {
            let (ln, line) = self.next_line(&format!("state {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if line == "initial" {
                initial = true;
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected state line: {line}")));
        }

        let id = self.id_or_generate(meta.id, &format!("state_{object}_{name}"));
        Ok(StateDef {
            name,
            id,
            initial,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn transition_block(
        &mut self,
        name: String,
        block_line: usize,
        object: &str,
    ) -> Result<TransitionDef> {
        let mut meta = Meta::default();
        let mut from_state = None;
        let mut to_state = None;
        let mut fields = Vec::new();
        let scope = format!("trans_{object}_{name}");
        loop {
            let (ln, line) = self.next_line(&format!("transition {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = FROM_LINE.captures(&line) {
                from_state = Some(c[1].to_string());
                continue;
            }
            if let Some(c) = TO_LINE.captures(&line) {
                to_state = Some(c[1].to_string());
                continue;
            }
            if let Some(c) = FIELD_OPEN.captures(&line) {
                fields.push(self.field_block(c[1].to_string(), ln, &scope)?);
                continue;
            }
            return Err(Error::parse(
                ln,
                format!("unexpected transition line: {line}"),
            ));
        }

        let (Some(from_state), Some(to_state)) = (from_state, to_state) else {
            return Err(Error::parse(
                block_line,
                format!("transition {name} missing from/to"),
            ));
        };
        let id = self.id_or_generate(meta.id, &scope);
        Ok(TransitionDef {
            name,
            id,
            from_state,
            to_state,
            fields,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn action_block(
        &mut self,
        name: String,
        block_line: usize,
    ) -> Result<(ActionDef, Option<ShapeDef>, Option<ShapeDef>)> {
        let mut meta = Meta::default();
        let mut kind = None;
        let mut input_shape: Option<String> = None;
        let mut output: Option<ActionOutput> = None;
        let mut inline_input = None;
        let mut inline_output = None;
        let pascal = pascal_case(&name);

        loop {
            let (ln, line) = self.next_line(&format!("action {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = KIND_LINE.captures(&line) {
                kind = Some(c[1].to_string());
                continue;
            }

            let is_input = line == "input {" || line.starts_with("input ");
            let is_output = line == "output {" || line.starts_with("output ");
            if is_input && input_shape.is_some() {
                return Err(Error::parse(
                    ln,
                    format!("action {name} defines input more than once"),
                ));
            }
            if is_output && output.is_some() {
                return Err(Error::parse(
                    ln,
                    format!("action {name} defines output more than once"),
                ));
            }

            if line == "input {" {
                let shape_name = format!("{pascal}Command");
                let shape =
                    self.shape_block(shape_name.clone(), ln, "action input", &format!("ain_{name}"))?;
                input_shape = Some(shape_name);
                inline_input = Some(shape);
                continue;
            }
            if let Some(c) = INPUT_REF.captures(&line) {
                input_shape = Some(c[1].to_string());
                continue;
            }
            if line == "output {" {
                let shape_name = format!("{pascal}Result");
                let shape = self.shape_block(
                    shape_name.clone(),
                    ln,
                    "action output",
                    &format!("aout_{name}"),
                )?;
                output = Some(ActionOutput::Shape(shape_name));
                inline_output = Some(shape);
                continue;
            }
            if let Some(c) = OUTPUT_SIGNAL.captures(&line) {
                output = Some(ActionOutput::Signal(c[1].to_string()));
                continue;
            }
            if let Some(c) = OUTPUT_TRANSITION.captures(&line) {
                output = Some(ActionOutput::Transition {
                    object: c[1].to_string(),
                    transition: c[2].to_string(),
                });
                continue;
            }
            if let Some(c) = OUTPUT_REF.captures(&line) {
                output = Some(ActionOutput::Shape(c[1].to_string()));
                continue;
            }
            if is_input {
                return Err(Error::parse(
                    ln,
                    format!("action {name} input must be 'input {{ ... }}' or 'input <ShapeName>'"),
                ));
            }
            if is_output {
                return Err(Error::parse(
                    ln,
                    format!(
                        "action {name} output must be one of 'output {{ ... }}', 'output <ShapeName>', \
                         'output signal <SignalName>', or 'output transition <ObjectName>.<TransitionName>'"
                    ),
                ));
            }
            return Err(Error::parse(ln, format!("unexpected action line: {line}")));
        }

        let kind =
            kind.ok_or_else(|| Error::parse(block_line, format!("action {name} missing kind")))?;
        let id = self.id_or_generate(meta.id, &format!("act_{name}"));
        let action = ActionDef {
            name,
            id,
            kind,
            input_shape,
            output: output.unwrap_or(ActionOutput::Elided),
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        };
        Ok((action, inline_input, inline_output))
    }

    fn trigger_block(&mut self, name: String, block_line: usize) -> Result<TriggerDef> {
        let mut meta = Meta::default();
        let mut event_name = None;
        let mut action_name = None;
        loop {
            let (ln, line) = self.next_line(&format!("trigger {name}"), block_line)?;
            if line == "}" {
                break;
            }
            if self.metadata(ln, &line, &mut meta)? {
                continue;
            }
            if let Some(c) = WHEN_EVENT.captures(&line) {
                event_name = Some(c[1].to_string());
                continue;
            }
            if let Some(c) = INVOKE_LINE.captures(&line) {
                action_name = Some(c[1].to_string());
                continue;
            }
            return Err(Error::parse(ln, format!("unexpected trigger line: {line}")));
        }

        let (Some(event_name), Some(action_name)) = (event_name, action_name) else {
            return Err(Error::parse(
                block_line,
                format!("trigger {name} missing when/invoke"),
            ));
        };
        let id = self.id_or_generate(meta.id, &format!("trg_{name}"));
        Ok(TriggerDef {
            name,
            id,
            event_name,
            action_name,
            description: meta.description,
            display_name: meta.display_name,
            line: block_line,
        })
    }

    fn id_or_generate(&mut self, explicit: Option<String>, base: &str) -> String {
        match explicit {
            Some(id) => id,
            None => self.ids.generate(base),
        }
    }
}

fn key_field_names(raw: &str, line: usize) -> Result<Vec<String>> {
    let names: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();
    if names.iter().any(|n| n.is_empty()) {
        return Err(Error::parse(
            line,
            "key declaration must include one or more field names",
        ));
    }
    let invalid: Vec<&str> = names
        .iter()
        .filter(|n| !IDENTIFIER.is_match(n))
        .map(String::as_str)
        .collect();
    if !invalid.is_empty() {
        return Err(Error::parse(
            line,
            format!(
                "key declaration contains invalid field names: {}",
                invalid.join(", ")
            ),
        ));
    }
    Ok(names)
}
