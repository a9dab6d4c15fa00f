//! Hover: keyword documentation for the Kconfig language itself, plus
//! type/value/help information for a resolved symbol.

use tower_lsp::lsp_types as lsp;

use crate::ast::{LineIndex, Value};
use crate::context::Context;
use crate::graph::{SymbolGraph, SymbolId};
use crate::resolve::visibility;
use crate::text::{strip_config_prefix, word_at_offset};

pub fn hover(ctx: &Context, text: &str, pos: lsp::Position) -> Option<lsp::Hover> {
    let lines = LineIndex::new(text);
    let offset = lines.offset(pos.line, pos.character);
    let word = word_at_offset(text, offset)?;

    if let Some(doc) = keyword_docs(&word) {
        return Some(markdown_hover(doc.to_string()));
    }

    let name = strip_config_prefix(&word);
    let id = ctx.graph.lookup(name)?;
    Some(markdown_hover(render_symbol(&ctx.graph, id)))
}

fn markdown_hover(value: String) -> lsp::Hover {
    lsp::Hover {
        contents: lsp::HoverContents::Markup(lsp::MarkupContent {
            kind: lsp::MarkupKind::Markdown,
            value,
        }),
        range: None,
    }
}

fn render_symbol(graph: &SymbolGraph, id: SymbolId) -> String {
    let sym = graph.symbol(id);
    let kind_label = if sym.nodes.iter().any(|&n| graph.node(n).is_menuconfig) {
        "menuconfig"
    } else {
        "config"
    };

    let mut out = format!("**{}** ({}) `{}`", sym.name, kind_label, sym.kind.as_str());

    if let Some((prompt, _)) = sym.nodes.iter().find_map(|&n| graph.node(n).prompt.clone()) {
        out.push_str(&format!("\n\n*\"{}\"*", prompt));
    }

    let value = sym
        .computed_value
        .clone()
        .unwrap_or_else(|| Value::zero_for(sym.kind));
    out.push_str(&format!("\n\nType: {}\nValue: {}", sym.kind.as_str(), value.display_str()));
    if visibility(graph, id) == crate::ast::Tri::No {
        out.push_str(" (not visible)");
    }

    if let Some(loc) = sym.nodes.first().map(|&n| &graph.node(n).loc) {
        out.push_str(&format!("\n\nDefined in `{}`", loc.file));
    }

    if let Some(help) = sym.nodes.iter().find_map(|&n| graph.node(n).help.clone()) {
        out.push_str(&format!("\n\n---\n\n{}", help));
    }

    out
}

fn keyword_docs(word: &str) -> Option<&'static str> {
    Some(match word {
        "config" => {
            "\
**config** `<symbol>`

Starts a new config entry. The following lines define attributes for \
this config option. Attributes can be the type of the config option, \
input prompt, dependencies, help text and default values. A config \
option can be defined multiple times with the same name, but every \
definition can have only a single input prompt and the type must not \
conflict."
        }

        "menuconfig" => {
            "\
**menuconfig** `<symbol>`

Similar to `config`, but also gives a hint to front ends that all \
sub-options should be displayed as a separate list of options. To make \
sure all the sub-options will really show up under the menuconfig entry \
and not outside of it, every item from the options list must depend on \
the menuconfig symbol.

```kconfig
menuconfig M
if M
    config C1
    config C2
endif
```"
        }

        "choice" | "endchoice" => {
            "\
**choice** / **endchoice**

Defines a choice group. A choice allows only a single config entry \
to be selected. Accepts `prompt`, `default`, `depends on`, and `help` \
attributes.

```kconfig
choice
    prompt \"Choose one\"
    default OPT_A

config OPT_A
    bool \"Option A\"

config OPT_B
    bool \"Option B\"

endchoice
```"
        }

        "comment" => {
            "\
**comment** `<prompt>`

Defines a comment which is displayed to the user during the \
configuration process and is also echoed to the output files. \
The only possible options are dependencies."
        }

        "menu" | "endmenu" => {
            "\
**menu** `<prompt>` / **endmenu**

Defines a menu block. All entries within the `menu` ... `endmenu` \
block become a submenu. All sub-entries inherit the dependencies \
from the menu entry. The only possible options are dependencies \
and `visible` attributes."
        }

        "if" | "endif" => {
            "\
**if** `<expr>` / **endif**

Defines an if block. The dependency expression is appended to all \
enclosed menu entries."
        }

        "source" => {
            "\
**source** `<path>`

Reads the specified configuration file. This file is always parsed."
        }

        "mainmenu" => {
            "\
**mainmenu** `<prompt>`

Sets the config program's title bar. It should be placed at the top \
of the configuration, before any other statement."
        }

        "bool" => {
            "\
**bool** [`<prompt>`]

Boolean type. The config option can be `y` (built-in) or `n` (disabled)."
        }

        "tristate" => {
            "\
**tristate** [`<prompt>`]

Tristate type. The config option can be `y` (built-in), `m` (module), \
or `n` (disabled)."
        }

        "string" => {
            "\
**string** [`<prompt>`]

String type. The config option holds a free-form string value."
        }

        "hex" => {
            "\
**hex** [`<prompt>`]

Hexadecimal type. The config option holds a hex value (e.g. `0x1234`)."
        }

        "int" => {
            "\
**int** [`<prompt>`]

Integer type. The config option holds a decimal integer value."
        }

        "prompt" => {
            "\
**prompt** `<prompt>` [`if` `<expr>`]

Sets the input prompt displayed to the user. Every menu entry can have \
at most one prompt. Optionally, a dependency for this prompt can be \
added with `if`."
        }

        "default" => {
            "\
**default** `<expr>` [`if` `<expr>`]

Sets a default value. If multiple default values are visible, only the \
first defined one is active. Default values are not limited to the menu \
entry where they are defined.

The default value deliberately defaults to `n` in order to avoid \
bloating the build. With few exceptions, new config options should not \
change this."
        }

        "def_bool" => {
            "\
**def_bool** `<expr>` [`if` `<expr>`]

Shorthand for a `bool` type definition plus a default value."
        }

        "def_tristate" => {
            "\
**def_tristate** `<expr>` [`if` `<expr>`]

Shorthand for a `tristate` type definition plus a default value."
        }

        "depends" => {
            "\
**depends on** `<expr>`

Defines a dependency for this menu entry. If multiple dependencies \
are defined, they are connected with `&&`. Dependencies are applied \
to all other options within this menu entry."
        }

        "select" => {
            "\
**select** `<symbol>` [`if` `<expr>`]

Reverse dependency. Forces a lower limit on another symbol. The value \
of the current menu symbol is used as the minimal value the selected \
symbol can be set to.

**Note:** `select` should be used with care. It will force a symbol \
to a value without visiting the dependencies. In general use `select` \
only for non-visible symbols (no prompts) and for symbols with no \
dependencies."
        }

        "imply" => {
            "\
**imply** `<symbol>` [`if` `<expr>`]

Weak reverse dependency. Similar to `select` but the implied symbol's \
value may still be set to `n` from a direct dependency or with a \
visible prompt."
        }

        "visible" => {
            "\
**visible if** `<expr>`

Only applicable to menu blocks. If the condition is false, the menu \
block is not displayed to the user (the symbols contained there can \
still be selected by other symbols, though). Default value is `true`."
        }

        "range" => {
            "\
**range** `<symbol>` `<symbol>` [`if` `<expr>`]

Limits the range of possible input values for `int` and `hex` symbols. \
The user can only input a value which is `>=` the first symbol and \
`<=` the second symbol."
        }

        "help" => {
            "\
**help**

Defines a help text. The end of the help text is determined by the \
indentation level — it ends at the first line which has a smaller \
indentation than the first line of the help text.

Per kernel coding style: help text is indented with one tab plus two \
additional spaces."
        }

        "modules" => {
            "\
**modules**

Declares the symbol to be used as the `MODULES` symbol, which enables \
the third modular state for all config symbols. At most one symbol may \
have the `modules` option set."
        }

        "transitional" => {
            "\
**transitional**

Declares the symbol as transitional, meaning it should be processed \
during configuration but omitted from newly written `.config` files. \
Useful for backward compatibility during config option migrations.

A transitional symbol has no prompt, is not written to new `.config` \
files, and cannot have any other properties."
        }

        "optional" => {
            "\
**optional**

Marks a choice as optional — the user may leave all options unselected."
        }

        "on" => {
            "\
Part of the **depends on** syntax. See `depends`."
        }

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManager;
    use crate::env::Env;
    use crate::graph::FileSource;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemSource(Mutex<HashMap<String, String>>);
    impl FileSource for MemSource {
        fn read(&self, path: &str) -> std::io::Result<String> {
            self.0
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }
        fn is_dir(&self, _path: &str) -> bool {
            false
        }
    }

    #[test]
    fn hovering_a_keyword_shows_its_doc() {
        let mut files = HashMap::new();
        files.insert("Kconfig".to_string(), "config FOO\n\tbool \"f\"\n".to_string());
        let src = MemSource(Mutex::new(files));
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("Kconfig".into(), vec![], Env::new(), &src).unwrap();
        let ctx = mgr.get(id).unwrap();

        let hover = hover(ctx, "config FOO\n", lsp::Position::new(0, 2)).unwrap();
        match hover.contents {
            lsp::HoverContents::Markup(m) => assert!(m.value.contains("Starts a new config entry")),
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn hovering_a_symbol_shows_type_and_value() {
        let mut files = HashMap::new();
        files.insert("Kconfig".to_string(), "config FOO\n\tbool \"Enable foo\"\n\thelp\n\t  Turns on foo\n".to_string());
        files.insert("prj.conf".to_string(), "CONFIG_FOO=y\n".to_string());
        let src = MemSource(Mutex::new(files));
        let mut mgr = ContextManager::new();
        let id = mgr.add_build("Kconfig".into(), vec!["prj.conf".into()], Env::new(), &src).unwrap();
        let ctx = mgr.get(id).unwrap();

        let hover = hover(ctx, "CONFIG_FOO=y\n", lsp::Position::new(0, 9)).unwrap();
        match hover.contents {
            lsp::HoverContents::Markup(m) => {
                assert!(m.value.contains("Type: bool"));
                assert!(m.value.contains("Value: y"));
                assert!(m.value.contains("Enable foo"));
                assert!(m.value.contains("Turns on foo"));
            }
            _ => panic!("expected markup"),
        }
    }
}
