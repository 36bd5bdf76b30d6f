fn main() {
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(path) = protoc_bin_vendored::protoc_bin_path() {
            unsafe { std::env::set_var("PROTOC", path) };
        }
    }
    let config = tonic_prost_build::Config::new();
    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/snowflake.proto"], &["proto"])
        .unwrap();
}
