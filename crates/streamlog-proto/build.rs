// Build script to compile protobuf files into Rust code.
//
// Runs at compile time and generates message structs plus client/server
// traits for the three StreamLog services.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::compile_protos("proto/streamlog.proto")?;
    Ok(())
}
