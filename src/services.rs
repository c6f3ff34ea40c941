/// Well-known TCP services reported by port sweeps, sorted by port.
const CATALOG: &[(u16, &str)] = &[
    (20, "FTP-data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (8080, "HTTP-alt"),
    (8443, "HTTPS-alt"),
];

/// Service name for `port`, or `None` when the port is not catalogued.
pub fn lookup(port: u16) -> Option<&'static str> {
    CATALOG
        .binary_search_by_key(&port, |&(p, _)| p)
        .ok()
        .map(|idx| CATALOG[idx].1)
}
