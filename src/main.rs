use magpie::{
    cache, config,
    context::Context,
    dispatcher::{Dispatcher, DEFAULT_CAPACITY},
    handlers, rpc, server,
};

fn main() {
    lazy_static::initialize(&config::C);
    if let Err(e) = run(&config::C) {
        log::error!("magpie failed, {:?}", e);
        std::process::exit(1);
    }
}

fn run(cfg: &'static config::Config) -> anyhow::Result<()> {
    let ctx = Context::init(cfg)?;
    cache::reset_login_count(&ctx)?;
    let _rpc_server = rpc::server::serve(ctx.clone())?;
    let (dispatch, logic) = {
        let ctx = ctx.clone();
        Dispatcher::start(DEFAULT_CAPACITY, move |(session, msg_id, payload)| {
            handlers::route(&ctx, session, msg_id, payload)
        })
    };
    server::serve(ctx.clone(), dispatch.clone())?;

    // coarse ordered teardown: the accept loop is gone and the io pool
    // went with it; close the peer pools, drain the dispatcher, then
    // take this node out of the allocation pool
    ctx.peers.close_all();
    dispatch.stop();
    let _ = logic.join();
    cache::remove_login_count(&ctx);
    log::info!("bye!");
    Ok(())
}
