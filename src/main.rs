use tower_lsp::{LspService, Server};

use kconfig_lsp::server::Backend;

#[tokio::main]
async fn main() {
    env_logger::init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method("kconfig/addBuild", Backend::add_build)
        .custom_method("kconfig/search", Backend::search)
        .custom_method("kconfig/setMenu", Backend::set_menu)
        .custom_method("kconfig/setVal", Backend::set_val)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;
}
