fn main() -> std::io::Result<()> {
    // `groupcall.rs` is checked in. Regenerate it only when `GENERATE_PROTO`
    // is set, after editing `groupcall.proto`.
    if std::env::var("GENERATE_PROTO").is_err() {
        println!("cargo:rerun-if-changed=build.rs");
        return Ok(());
    }

    println!("cargo:rerun-if-changed=src/groupcall.proto");
    println!("cargo:warning=GENERATE_PROTO is set, regenerating group call messages...");

    let mut config = prost_build::Config::new();
    config.type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]");
    config.out_dir("src/");

    config.compile_protos(&["src/groupcall.proto"], &["src/"])?;
    Ok(())
}
