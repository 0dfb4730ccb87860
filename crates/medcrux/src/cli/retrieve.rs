use anyhow::{bail, Result};

use medcrux_core::{Retriever, Settings};

use super::print_json;

pub fn run(settings: &Settings, query: &str, context: bool) -> Result<()> {
    let Some(kb_dir) = &settings.kb_dir else {
        bail!("no knowledge base: pass --kb or set {}", Settings::KB_DIR_VAR);
    };

    let retriever = Retriever::open(kb_dir)?;
    let result = retriever.retrieve(query);

    if context {
        print!("{}", result.render_context());
        Ok(())
    } else {
        print_json(&result)
    }
}
