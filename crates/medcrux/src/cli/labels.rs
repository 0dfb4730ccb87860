use anyhow::Result;

use medcrux_core::extract_label_set;

use super::print_json;

pub fn run(text: &str) -> Result<()> {
    print_json(&extract_label_set(text))
}
