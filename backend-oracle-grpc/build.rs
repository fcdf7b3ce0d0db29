fn main() {
    std::env::set_var(
        "PROTOC",
        protoc_bin_vendored::protoc_bin_path().expect("failed to locate vendored protoc"),
    );
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile(&["proto/oracle.proto"], &["proto"])
        .expect("failed to compile oracle proto definitions");
}
