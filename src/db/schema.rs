use rusqlite::Connection;

/// Initialize the schema. Table names follow the document collections the
/// web app already uses (perguntas, respostas, saldos, ...).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users (identity provider uid is the primary key)
        CREATE TABLE IF NOT EXISTS usuarios (
            id TEXT PRIMARY KEY,
            email TEXT,
            name TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Questions
        CREATE TABLE IF NOT EXISTS perguntas (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            text TEXT NOT NULL,
            reward_cents INTEGER NOT NULL CHECK (reward_cents > 0),
            status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'answered', 'closed')),
            accepted_answer_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_perguntas_owner ON perguntas(owner_id);

        -- Answers
        CREATE TABLE IF NOT EXISTS respostas (
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL REFERENCES perguntas(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL,
            text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted')),
            payment_confirmed INTEGER NOT NULL DEFAULT 0,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_respostas_question ON respostas(question_id);

        -- Balances (one row per user, created lazily on first credit)
        CREATE TABLE IF NOT EXISTS saldos (
            user_id TEXT PRIMARY KEY,
            available_cents INTEGER NOT NULL DEFAULT 0 CHECK (available_cents >= 0),
            earned_cents INTEGER NOT NULL DEFAULT 0,
            withdrawn_cents INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );

        -- Ledger entries (append-only)
        CREATE TABLE IF NOT EXISTS transacoes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('credit', 'debit')),
            gross_cents INTEGER NOT NULL,
            net_cents INTEGER NOT NULL,
            fee_cents INTEGER NOT NULL,
            fee_bps INTEGER NOT NULL,
            question_id TEXT,
            answer_id TEXT,
            gateway_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
            created_at INTEGER NOT NULL,
            CHECK (gross_cents = net_cents + fee_cents)
        );
        CREATE INDEX IF NOT EXISTS idx_transacoes_user ON transacoes(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_transacoes_gateway ON transacoes(gateway_id) WHERE gateway_id IS NOT NULL;
        -- At most one credit per answer
        CREATE UNIQUE INDEX IF NOT EXISTS idx_transacoes_answer_credit ON transacoes(answer_id) WHERE kind = 'credit';

        -- Premium subscriptions
        CREATE TABLE IF NOT EXISTS assinaturas (
            user_id TEXT PRIMARY KEY,
            status TEXT NOT NULL CHECK (status IN ('active', 'canceled', 'payment_failed')),
            plan TEXT NOT NULL,
            external_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assinaturas_external ON assinaturas(external_id);

        -- Charges created at a gateway for an answer
        CREATE TABLE IF NOT EXISTS cobrancas (
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL REFERENCES perguntas(id) ON DELETE CASCADE,
            answer_id TEXT NOT NULL REFERENCES respostas(id) ON DELETE CASCADE,
            payer_id TEXT NOT NULL,
            gateway TEXT NOT NULL CHECK (gateway IN ('stripe', 'abacatepay')),
            method TEXT NOT NULL CHECK (method IN ('cartao', 'pix')),
            amount_cents INTEGER NOT NULL,
            gateway_charge_id TEXT,
            url TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'failed')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cobrancas_answer ON cobrancas(question_id, answer_id, created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_cobrancas_gateway_charge ON cobrancas(gateway, gateway_charge_id) WHERE gateway_charge_id IS NOT NULL;
        "#,
    )?;

    Ok(())
}
