fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts are single-threaded.
        unsafe { std::env::set_var("PROTOC", protoc) };
    }

    tonic_build::configure()
        .btree_map(["."])
        .compile_protos(&["proto/gridstat.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/gridstat.proto");
    Ok(())
}
