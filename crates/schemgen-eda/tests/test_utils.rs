use schemgen_eda::{KicadSymbolLibrary, SymbolCatalog};
use std::path::PathBuf;

pub fn resource_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/resources")
        .join(name)
}

pub fn demo_library() -> KicadSymbolLibrary {
    let _ = env_logger::builder().is_test(true).try_init();
    KicadSymbolLibrary::from_file(&resource_path("Demo.kicad_sym")).unwrap()
}

pub fn demo_catalog() -> SymbolCatalog {
    SymbolCatalog::new().with_library("Demo", demo_library())
}
