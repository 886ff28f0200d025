use std::{borrow::Cow, env};

use anyhow::{Result, anyhow};
use geoloc_app_lib::mk_specta;
use specta_typescript::Typescript;

const DEFAULT_OUT: &str = "src/bindings.ts";

fn main() -> Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_OUT.to_string());

    let mut lang = Typescript::new();
    lang.header = Cow::Borrowed(
        "// Generated by geoloc-app's export-types, edit the Rust side instead\n/* eslint @typescript-eslint/no-unused-vars: 0 */",
    );

    mk_specta()
        .export(lang, &path)
        .map_err(|why| anyhow!("Failed to export location bindings to {path}: {why:?}"))?;

    println!("Wrote location commands, events and types to {path}");
    Ok(())
}
