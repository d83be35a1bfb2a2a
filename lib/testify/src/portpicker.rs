use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use rand::Rng;

pub type Port = u16;

fn is_free_tcp(ip: IpAddr, port: Port) -> bool {
    TcpListener::bind(SocketAddr::new(ip, port)).is_ok()
}

/// Asks the OS for a free port
fn ask_free_tcp_port(ip: IpAddr) -> Option<Port> {
    Some(
        TcpListener::bind(SocketAddr::new(ip, 0))
            .ok()?
            .local_addr()
            .ok()?
            .port(),
    )
}

/// Picks a TCP port which is free on the given address.
pub fn pick_unused_port(ip: IpAddr) -> Port {
    let mut rng = rand::rng();

    loop {
        // Try random port first
        for _ in 0..10 {
            let port = rng.random_range(15000..25000);
            if is_free_tcp(ip, port) {
                return port;
            }
        }

        if let Some(port) = ask_free_tcp_port(ip) {
            return port;
        }
    }
}

/// A free address on the loopback interface.
pub fn pick_unused_local_port() -> SocketAddr {
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    SocketAddr::new(ip, pick_unused_port(ip))
}
